use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

/// A possibly-absent comparison value.
///
/// `None` means the value was never supplied; entries built from it are dropped from the compiled
/// condition. `Some(Value::Null)` is an explicit null.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Operand(pub Option<Value>);

impl Operand {
    #[must_use]
    pub fn absent() -> Self {
        Operand(None)
    }

    #[must_use]
    pub fn null() -> Self {
        Operand(Some(Value::Null))
    }

    #[must_use]
    pub fn into_inner(self) -> Option<Value> {
        self.0
    }
}

macro_rules! operand_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand(Some(Value::from(value)))
                }
            }

            impl From<Option<$ty>> for Operand {
                fn from(value: Option<$ty>) -> Self {
                    Operand(value.map(Value::from))
                }
            }
        )*
    };
}

operand_from!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, bool, String, &str);

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand(Some(value))
    }
}

impl From<Option<Value>> for Operand {
    fn from(value: Option<Value>) -> Self {
        Operand(value)
    }
}

impl From<&String> for Operand {
    fn from(value: &String) -> Self {
        Operand(Some(Value::String(value.clone())))
    }
}

impl From<DateTime<Utc>> for Operand {
    fn from(value: DateTime<Utc>) -> Self {
        Operand(Some(Value::String(
            value.to_rfc3339_opts(SecondsFormat::Millis, true),
        )))
    }
}

impl From<Option<DateTime<Utc>>> for Operand {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or_else(Operand::absent, Operand::from)
    }
}

impl From<NaiveDateTime> for Operand {
    fn from(value: NaiveDateTime) -> Self {
        Operand::from(value.and_utc())
    }
}
