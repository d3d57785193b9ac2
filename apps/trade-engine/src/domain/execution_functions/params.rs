//! Typed access to a function's parameter map.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::errors::FunctionError;

pub(super) struct ParamReader<'a> {
    function: &'static str,
    params: &'a Map<String, Value>,
}

impl<'a> ParamReader<'a> {
    /// Wrap `params`, rejecting any key not in `allowed`.
    pub(super) fn new(
        function: &'static str,
        params: &'a Map<String, Value>,
        allowed: &[&str],
    ) -> Result<Self, FunctionError> {
        if let Some(unknown) = params.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(FunctionError::UnknownParameter {
                function,
                parameter: unknown.clone(),
            });
        }
        Ok(Self { function, params })
    }

    fn get(&self, name: &str) -> Option<&'a Value> {
        self.params.get(name).filter(|v| !v.is_null())
    }

    pub(super) fn invalid(&self, name: &str, message: impl Into<String>) -> FunctionError {
        FunctionError::InvalidParameter {
            function: self.function,
            parameter: name.to_string(),
            message: message.into(),
        }
    }

    pub(super) fn required_decimal(&self, name: &str) -> Result<Decimal, FunctionError> {
        self.optional_decimal(name)?
            .ok_or_else(|| FunctionError::MissingParameter {
                function: self.function,
                parameter: name.to_string(),
            })
    }

    pub(super) fn optional_decimal(&self, name: &str) -> Result<Option<Decimal>, FunctionError> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => {
                let text = n.to_string();
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .ok()
            }
            Value::String(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| self.invalid(name, format!("expected a number, got {value}")))
    }

    pub(super) fn optional_u64(&self, name: &str) -> Result<Option<u64>, FunctionError> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        value
            .as_u64()
            .map(Some)
            .ok_or_else(|| self.invalid(name, format!("expected a non-negative integer, got {value}")))
    }

    pub(super) fn optional_str(&self, name: &str) -> Result<Option<&'a str>, FunctionError> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        value
            .as_str()
            .map(Some)
            .ok_or_else(|| self.invalid(name, format!("expected a string, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn rejects_unknown_keys() {
        let map = params(json!({ "threshold": 1, "treshold": 2 }));
        let err = ParamReader::new("close_above", &map, &["threshold"])
            .err()
            .unwrap();
        assert_eq!(
            err,
            FunctionError::UnknownParameter {
                function: "close_above",
                parameter: "treshold".to_string()
            }
        );
    }

    #[test]
    fn reads_numbers_and_numeric_strings() {
        let map = params(json!({ "a": 180.5, "b": "178.25", "c": 3 }));
        let reader = ParamReader::new("f", &map, &["a", "b", "c"]).unwrap();
        assert_eq!(reader.required_decimal("a").unwrap(), dec!(180.5));
        assert_eq!(reader.required_decimal("b").unwrap(), dec!(178.25));
        assert_eq!(reader.optional_u64("c").unwrap(), Some(3));
        assert_eq!(reader.optional_decimal("missing").unwrap(), None);
    }

    #[test]
    fn wrong_types_are_invalid() {
        let map = params(json!({ "a": "abc", "c": -1 }));
        let reader = ParamReader::new("f", &map, &["a", "c"]).unwrap();
        assert!(matches!(
            reader.required_decimal("a"),
            Err(FunctionError::InvalidParameter { .. })
        ));
        assert!(reader.optional_u64("c").is_err());
    }
}
