use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Frequency {
    OneShot => "one_shot",
    Weekly => "weekly",
    Biweekly => "biweekly",
    Monthly => "monthly",
});

str_enum!(ReminderStatus {
    Active => "active",
    Done => "done",
    Cancelled => "cancelled",
});

impl Frequency {
    /// Every frequency except `one_shot` reschedules on completion.
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Self::OneShot)
    }
}

impl ReminderStatus {
    /// `done` and `cancelled` have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}
