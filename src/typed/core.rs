use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock};

use http::StatusCode;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::extract::from_pairs;
use crate::dispatcher::{Handler, HandlerResponse, HandlerResult, RequestContext};
use crate::error::{ApiError, SuccessResponse};

/// Extracted inputs handed to a typed handler.
///
/// Each slot is `Some` only when the handler was built with an extractor for
/// it, and by then the value has already passed its [`Validator`].
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRequest<P, B, Q> {
    pub params: Option<P>,
    pub body: Option<B>,
    pub query: Option<Q>,
}

/// One failed field check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    /// Short rule name, e.g. `required` or `max`.
    pub tag: String,
    pub message: String,
}

/// Every check that failed for one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    #[must_use]
    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    /// 400 with the field list under `details`.
    #[must_use]
    pub fn into_api_error(self) -> ApiError {
        let message = self.to_string();
        let details = serde_json::to_value(&self.0).unwrap_or_default();
        ApiError::new(StatusCode::BAD_REQUEST, "validation_failed", message).with_details(details)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => Ok(()),
            [only] => f.write_str(&only.message),
            many => write!(f, "validation failed on {} fields", many.len()),
        }
    }
}

#[allow(clippy::expect_used)]
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$")
        .expect("email regex should be valid")
});

type Rule<T> = Box<dyn Fn(&T) -> Option<FieldError> + Send + Sync>;

/// Field checks for `T`, built once and shared by every request.
///
/// ```rust
/// use nimbus::typed::Validator;
///
/// struct NewUser {
///     name: String,
///     email: String,
///     age: i64,
/// }
///
/// let validator = Validator::new()
///     .required("name", |u: &NewUser| u.name.as_str())
///     .length("name", |u: &NewUser| u.name.as_str(), 3, 50)
///     .email("email", |u: &NewUser| u.email.as_str())
///     .range("age", |u: &NewUser| u.age, 0, 150);
///
/// let bad = NewUser { name: "al".into(), email: "nope".into(), age: 30 };
/// assert_eq!(validator.validate(&bad).unwrap_err().fields().len(), 2);
/// ```
pub struct Validator<T> {
    rules: Vec<Rule<T>>,
}

impl<T> Default for Validator<T> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<T> fmt::Debug for Validator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl<T> Validator<T> {
    /// Run every rule and collect all failures.
    pub fn validate(&self, value: &T) -> Result<(), ValidationErrors> {
        let failures: Vec<FieldError> = self.rules.iter().filter_map(|rule| rule(value)).collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(failures))
        }
    }
}

impl<T: 'static> Validator<T> {
    /// A validator with no rules; every value passes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an arbitrary rule. `predicate` returns `true` when the value is valid.
    #[must_use]
    pub fn check<F>(
        mut self,
        field: &str,
        tag: &str,
        message: impl Into<String>,
        predicate: F,
    ) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let error = FieldError {
            field: field.to_string(),
            tag: tag.to_string(),
            message: message.into(),
        };
        self.rules
            .push(Box::new(move |value| (!predicate(value)).then(|| error.clone())));
        self
    }

    #[must_use]
    pub fn required<F>(self, field: &str, get: F) -> Self
    where
        F: Fn(&T) -> &str + Send + Sync + 'static,
    {
        let message = format!("{field} is required");
        self.check(field, "required", message, move |v| !get(v).trim().is_empty())
    }

    /// Character count within `min..=max`. Empty strings are left to
    /// [`required`](Self::required).
    #[must_use]
    pub fn length<F>(self, field: &str, get: F, min: usize, max: usize) -> Self
    where
        F: Fn(&T) -> &str + Send + Sync + 'static,
    {
        let message = format!("{field} must be between {min} and {max} characters");
        self.check(field, "length", message, move |v| {
            let s = get(v);
            s.is_empty() || (min..=max).contains(&s.chars().count())
        })
    }

    #[must_use]
    pub fn range<F>(self, field: &str, get: F, min: i64, max: i64) -> Self
    where
        F: Fn(&T) -> i64 + Send + Sync + 'static,
    {
        let message = format!("{field} must be between {min} and {max}");
        self.check(field, "range", message, move |v| (min..=max).contains(&get(v)))
    }

    /// ASCII `local@domain.tld` with an alphabetic TLD of two or more letters.
    #[must_use]
    pub fn email<F>(self, field: &str, get: F) -> Self
    where
        F: Fn(&T) -> &str + Send + Sync + 'static,
    {
        let message = format!("{field} must be a valid email address");
        self.check(field, "email", message, move |v| {
            let s = get(v);
            s.is_empty() || EMAIL.is_match(s)
        })
    }

    /// Value must match `pattern`. Anchor the expression for a full match.
    #[must_use]
    pub fn pattern<F>(self, field: &str, get: F, pattern: &Regex) -> Self
    where
        F: Fn(&T) -> &str + Send + Sync + 'static,
    {
        let pattern = pattern.clone();
        let message = format!("{field} format is invalid");
        self.check(field, "pattern", message, move |v| {
            let s = get(v);
            s.is_empty() || pattern.is_match(s)
        })
    }

    #[must_use]
    pub fn one_of<F>(self, field: &str, get: F, allowed: &'static [&'static str]) -> Self
    where
        F: Fn(&T) -> &str + Send + Sync + 'static,
    {
        let message = format!("{field} must be one of: {}", allowed.join(", "));
        self.check(field, "enum", message, move |v| {
            let s = get(v);
            s.is_empty() || allowed.contains(&s)
        })
    }
}

/// Adapts a function over [`TypedRequest`] into a route [`Handler`].
///
/// Extraction order is path params, then body, then query; the first slot
/// that fails to deserialize or validate ends the request with 400. The
/// function's `(status, data)` result is wrapped in a [`SuccessResponse`]
/// envelope.
///
/// ```rust,ignore
/// #[derive(Deserialize)]
/// struct ItemPath { id: u64 }
///
/// let handler = TypedHandler::new(|_ctx: &mut RequestContext, req: TypedRequest<ItemPath, (), ()>| {
///     let id = req.params.map(|p| p.id);
///     Ok((StatusCode::OK, json!({ "id": id })))
/// })
/// .with_params(Validator::new());
/// router.get("/items/:id", handler)?;
/// ```
pub struct TypedHandler<P, B, Q, R, F> {
    handler: F,
    params: Option<Arc<Validator<P>>>,
    body: Option<Arc<Validator<B>>>,
    query: Option<Arc<Validator<Q>>>,
    _marker: PhantomData<fn() -> R>,
}

impl<P, B, Q, R, F> TypedHandler<P, B, Q, R, F>
where
    F: Fn(&mut RequestContext, TypedRequest<P, B, Q>) -> Result<(StatusCode, R), ApiError>,
{
    /// A handler with no extractors; add them with the `with_*` methods.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            params: None,
            body: None,
            query: None,
            _marker: PhantomData,
        }
    }

    /// Extract path parameters into `P`.
    #[must_use]
    pub fn with_params(mut self, validator: Validator<P>) -> Self {
        self.params = Some(Arc::new(validator));
        self
    }

    /// Extract the JSON body into `B`.
    #[must_use]
    pub fn with_body(mut self, validator: Validator<B>) -> Self {
        self.body = Some(Arc::new(validator));
        self
    }

    /// Extract the query string into `Q`.
    #[must_use]
    pub fn with_query(mut self, validator: Validator<Q>) -> Self {
        self.query = Some(Arc::new(validator));
        self
    }
}

fn checked<T>(slot: &str, value: T, validator: &Validator<T>) -> Result<T, ApiError> {
    validator.validate(&value).map_err(|errors| {
        debug!(slot, failures = errors.fields().len(), "typed request failed validation");
        errors.into_api_error()
    })?;
    Ok(value)
}

impl<P, B, Q, R, F> Handler for TypedHandler<P, B, Q, R, F>
where
    P: DeserializeOwned + Send + Sync + 'static,
    B: DeserializeOwned + Send + Sync + 'static,
    Q: DeserializeOwned + Send + Sync + 'static,
    R: Serialize + 'static,
    F: Fn(&mut RequestContext, TypedRequest<P, B, Q>) -> Result<(StatusCode, R), ApiError>
        + Send
        + Sync
        + 'static,
{
    fn call(&self, ctx: &mut RequestContext) -> HandlerResult {
        let params = match &self.params {
            Some(validator) => {
                let pairs = ctx
                    .params()
                    .iter()
                    .map(|(k, v)| (Cow::Borrowed(&**k), Cow::Borrowed(v.as_str())));
                let value: P = from_pairs(pairs).map_err(|err| {
                    ApiError::new(StatusCode::BAD_REQUEST, "invalid_path_params", err.to_string())
                })?;
                Some(checked("params", value, validator)?)
            }
            None => None,
        };

        let body = match &self.body {
            Some(validator) => {
                let value: B = ctx.json()?;
                Some(checked("body", value, validator)?)
            }
            None => None,
        };

        let query = match &self.query {
            Some(validator) => {
                let value: Q = from_pairs(ctx.query_params()).map_err(|err| {
                    ApiError::new(StatusCode::BAD_REQUEST, "invalid_query", err.to_string())
                })?;
                Some(checked("query", value, validator)?)
            }
            None => None,
        };

        let (status, data) = (self.handler)(ctx, TypedRequest { params, body, query })?;
        let body = serde_json::to_value(SuccessResponse::new(data))?;
        Ok(HandlerResponse::json(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Signup {
        name: String,
        email: String,
        plan: String,
        seats: i64,
    }

    fn validator() -> Validator<Signup> {
        Validator::new()
            .required("name", |s: &Signup| s.name.as_str())
            .length("name", |s: &Signup| s.name.as_str(), 3, 20)
            .email("email", |s: &Signup| s.email.as_str())
            .one_of("plan", |s: &Signup| s.plan.as_str(), &["free", "pro"])
            .range("seats", |s: &Signup| s.seats, 1, 100)
    }

    fn signup(name: &str, email: &str, plan: &str, seats: i64) -> Signup {
        Signup {
            name: name.into(),
            email: email.into(),
            plan: plan.into(),
            seats,
        }
    }

    #[test]
    fn test_valid_value_passes() {
        assert!(validator().validate(&signup("alice", "a@b.io", "pro", 3)).is_ok());
    }

    #[test]
    fn test_collects_every_failure() {
        let errors = validator()
            .validate(&signup("", "not-an-email", "gold", 0))
            .unwrap_err();
        let tags: Vec<&str> = errors.fields().iter().map(|e| e.tag.as_str()).collect();
        assert_eq!(tags, ["required", "email", "enum", "range"]);
        assert_eq!(errors.to_string(), "validation failed on 4 fields");
    }

    #[test]
    fn test_single_failure_message() {
        let errors = validator()
            .validate(&signup("al", "a@b.io", "free", 1))
            .unwrap_err();
        assert_eq!(errors.to_string(), "name must be between 3 and 20 characters");
        let api = errors.into_api_error();
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
        assert_eq!(api.details().unwrap()[0]["field"], "name");
    }

    #[test]
    fn test_email_shapes() {
        for ok in ["test@example.com", "first.last+tag@sub.example.co.uk", "a_b%c@d-e.io"] {
            assert!(EMAIL.is_match(ok), "{ok}");
        }
        for bad in [
            "x@y.z",
            "a@b.12",
            "a!#$@b.com",
            "ü@b.com",
            "x@y",
            "@y.com",
            "x y@z.io",
            "x@@z.io",
        ] {
            assert!(!EMAIL.is_match(bad), "{bad}");
        }
    }

    #[test]
    fn test_email_rule_skips_empty() {
        let v = Validator::new().email("email", |s: &Signup| s.email.as_str());
        assert!(v.validate(&signup("bob", "", "", 1)).is_ok());
        assert_eq!(
            v.validate(&signup("bob", "bob@b.c", "", 1)).unwrap_err().fields()[0].message,
            "email must be a valid email address"
        );
    }

    #[test]
    fn test_pattern_rule() {
        let slug = Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap();
        let v = Validator::new().pattern("plan", |s: &Signup| s.plan.as_str(), &slug);
        assert!(v.validate(&signup("bob", "", "team-plan-2", 1)).is_ok());
        assert!(v.validate(&signup("bob", "", "", 1)).is_ok());

        let errors = v.validate(&signup("bob", "", "Team Plan", 1)).unwrap_err();
        assert_eq!(errors.fields()[0].tag, "pattern");
        assert_eq!(errors.to_string(), "plan format is invalid");
    }

    #[test]
    fn test_validate_needs_no_static_bound() {
        fn run<'a>(v: &Validator<&'a str>, value: &'a str) -> bool {
            v.validate(&value).is_ok()
        }
        let owned = String::from("borrowed");
        assert!(run(&Validator::default(), owned.as_str()));
    }

    #[test]
    fn test_custom_check() {
        let v = Validator::new().check("seats", "even", "seats must be even", |s: &Signup| s.seats % 2 == 0);
        assert!(v.validate(&signup("bob", "", "", 2)).is_ok());
        assert_eq!(v.validate(&signup("bob", "", "", 3)).unwrap_err().fields()[0].tag, "even");
    }
}
