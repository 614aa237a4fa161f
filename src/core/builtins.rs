// src/core/builtins.rs
//! Built-in functions. Names match case-insensitively and lose to user
//! bindings of the same name. `INPUT` suspends, so the interpreter runs it;
//! the rest are pure.

use crate::core::diagnostics::Location;
use crate::core::error::{RuntimeError, RuntimeErrorKind};
use crate::core::value::{format_number, parse_number, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Input,
    Len,
    Str,
    Num,
    Type,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        const TABLE: &[(&str, Builtin)] = &[
            ("input", Builtin::Input),
            ("len", Builtin::Len),
            ("str", Builtin::Str),
            ("num", Builtin::Num),
            ("type", Builtin::Type),
        ];
        TABLE.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, b)| *b)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Input => "INPUT",
            Builtin::Len => "LEN",
            Builtin::Str => "STR",
            Builtin::Num => "NUM",
            Builtin::Type => "TYPE",
        }
    }

    /// Accepted argument counts (inclusive).
    fn arity(self) -> (usize, usize) {
        match self {
            Builtin::Input => (0, 1),
            _ => (1, 1),
        }
    }

    pub fn check_arity(self, got: usize, location: Location) -> Result<(), RuntimeError> {
        let (min, max) = self.arity();
        if got < min || got > max {
            let expected = if min == max { min.to_string() } else { format!("{} to {}", min, max) };
            return Err(RuntimeError::new(
                RuntimeErrorKind::ArityMismatch,
                format!("{} expects {} argument(s), got {}", self.name(), expected, got),
                location,
            ));
        }
        Ok(())
    }

    /// Evaluate a pure builtin. `Input` never reaches here.
    pub fn call_pure(self, args: &[Value], location: Location) -> Result<Value, RuntimeError> {
        self.check_arity(args.len(), location)?;
        let arg = args.first().cloned().unwrap_or(Value::Null);
        match self {
            Builtin::Len => match &arg {
                Value::Str(s) => Ok(Value::Number(s.chars().count() as f64)),
                Value::Array(items) => Ok(Value::Number(items.len() as f64)),
                Value::Object(map) => Ok(Value::Number(map.len() as f64)),
                other => Err(RuntimeError::type_mismatch(
                    format!("LEN expects a string, array or object, got {}", other.type_name()),
                    location,
                )),
            },
            Builtin::Str => Ok(Value::Str(match &arg {
                Value::Number(n) => format_number(*n),
                other => other.to_string(),
            })),
            Builtin::Num => match &arg {
                Value::Number(_) => Ok(arg),
                Value::Str(s) => parse_number(s).map(Value::Number).ok_or_else(|| {
                    RuntimeError::type_mismatch(format!("NUM cannot convert '{}' to a number", s), location)
                }),
                Value::Bool(b) => Ok(Value::Number(if *b { 1.0 } else { 0.0 })),
                Value::Null => Ok(Value::Number(0.0)),
                other => Err(RuntimeError::type_mismatch(
                    format!("NUM cannot convert {} to a number", other.type_name()),
                    location,
                )),
            },
            Builtin::Type => Ok(Value::Str(arg.type_name().to_string())),
            Builtin::Input => Err(RuntimeError::new(
                RuntimeErrorKind::InvalidOperation,
                "INPUT must be awaited by the interpreter",
                location,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(b: Builtin, v: Value) -> Result<Value, RuntimeError> {
        b.call_pure(&[v], Location::at(1, 1))
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(Builtin::lookup("len"), Some(Builtin::Len));
        assert_eq!(Builtin::lookup("Input"), Some(Builtin::Input));
        assert_eq!(Builtin::lookup("length"), None);
    }

    #[test]
    fn len_counts_chars_and_items() {
        assert!(matches!(call(Builtin::Len, Value::Str("héllo".into())), Ok(Value::Number(n)) if n == 5.0));
        assert!(matches!(call(Builtin::Len, Value::Array(vec![Value::Null; 3])), Ok(Value::Number(n)) if n == 3.0));
        assert!(call(Builtin::Len, Value::Number(1.0)).is_err());
    }

    #[test]
    fn num_rejects_non_numeric_strings() {
        let err = call(Builtin::Num, Value::Str("abc".into())).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::TypeMismatch);
        assert!(matches!(call(Builtin::Num, Value::Str(" 42 ".into())), Ok(Value::Number(n)) if n == 42.0));
    }

    #[test]
    fn arity_is_checked() {
        let err = Builtin::Len.call_pure(&[], Location::at(1, 1)).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::ArityMismatch);
    }
}
