//! Deserialize typed structs from string pairs (path params, query strings).
//!
//! Values arrive as text, so the value deserializer parses on demand: a field
//! declared `u32` is parsed from its string, `bool` accepts `true/false/1/0`,
//! `Option<T>` is `Some` whenever the key is present, and unit enum variants
//! are matched by name. Repeated keys keep the last value.

use std::borrow::Cow;

use serde::de::value::{Error, MapDeserializer, StringDeserializer};
use serde::de::{self, DeserializeOwned, IntoDeserializer, Unexpected, Visitor};
use serde::forward_to_deserialize_any;

/// Build a `T` from `(name, value)` pairs.
pub(crate) fn from_pairs<'a, T, I>(pairs: I) -> Result<T, Error>
where
    T: DeserializeOwned,
    I: IntoIterator<Item = (Cow<'a, str>, Cow<'a, str>)>,
{
    let mut deduped: Vec<(String, String)> = Vec::new();
    for (name, value) in pairs {
        match deduped.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value.into_owned(),
            None => deduped.push((name.into_owned(), value.into_owned())),
        }
    }

    let entries = deduped.into_iter().map(|(name, value)| {
        let field = ParamValue {
            name: name.clone(),
            value,
        };
        (name, field)
    });
    T::deserialize(MapDeserializer::new(entries))
}

/// One textual value, remembered with its key for error messages.
struct ParamValue {
    name: String,
    value: String,
}

impl ParamValue {
    fn invalid(&self, expected: &dyn de::Expected) -> Error {
        de::Error::custom(format_args!(
            "{}: {}",
            self.name,
            <Error as de::Error>::invalid_value(Unexpected::Str(&self.value), expected)
        ))
    }
}

impl<'de> IntoDeserializer<'de, Error> for ParamValue {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

macro_rules! parse_value {
    ($($method:ident => $visit:ident,)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
                match self.value.trim().parse() {
                    Ok(parsed) => visitor.$visit(parsed),
                    Err(_) => Err(self.invalid(&visitor)),
                }
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for ParamValue {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_string(self.value)
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.value.as_str() {
            "true" | "1" => visitor.visit_bool(true),
            "false" | "0" => visitor.visit_bool(false),
            _ => Err(self.invalid(&visitor)),
        }
    }

    parse_value! {
        deserialize_i8 => visit_i8,
        deserialize_i16 => visit_i16,
        deserialize_i32 => visit_i32,
        deserialize_i64 => visit_i64,
        deserialize_u8 => visit_u8,
        deserialize_u16 => visit_u16,
        deserialize_u32 => visit_u32,
        deserialize_u64 => visit_u64,
        deserialize_f32 => visit_f32,
        deserialize_f64 => visit_f64,
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        let variant: StringDeserializer<Error> = self.value.into_deserializer();
        visitor.visit_enum(variant)
    }

    forward_to_deserialize_any! {
        i128 u128 char str string bytes byte_buf unit unit_struct seq tuple
        tuple_struct map struct identifier ignored_any
    }
}
