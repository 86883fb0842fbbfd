// Ticket metadata and the fixed lookup tables that map it into field elements
//
// The codes below are part of the signed message format. Changing any of
// them requires bumping METADATA_TABLE_VERSION.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::{Result, TicketError};
use super::primitives::{FieldElement, Timestamp};

pub const METADATA_TABLE_VERSION: u32 = 1;

/// Number of field elements a metadata record encodes to
pub const METADATA_FIELDS: usize = 5;

macro_rules! lookup_table {
    (
        $(#[$meta:meta])*
        $name:ident, $table:literal {
            $($variant:ident = $code:literal => [$($alias:literal),+]),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "u64", into = "u64")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn code(self) -> u64 {
                match self {
                    $($name::$variant => $code),+
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => [$($alias),+][0]),+
                }
            }

            pub fn from_code(code: u64) -> Result<Self> {
                match code {
                    $($code => Ok($name::$variant),)+
                    other => Err(TicketError::UnknownCode {
                        table: $table,
                        value: other.to_string(),
                    }),
                }
            }

            pub fn to_field(self) -> FieldElement {
                FieldElement::from_u64(self.code())
            }

            pub fn from_field(value: &FieldElement) -> Result<Self> {
                let code = value.to_u64().ok_or_else(|| TicketError::UnknownCode {
                    table: $table,
                    value: value.to_decimal(),
                })?;
                Self::from_code(code)
            }
        }

        impl TryFrom<u64> for $name {
            type Error = TicketError;

            fn try_from(code: u64) -> Result<Self> {
                Self::from_code(code)
            }
        }

        impl From<$name> for u64 {
            fn from(value: $name) -> u64 {
                value.code()
            }
        }

        impl FromStr for $name {
            type Err = TicketError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($($alias)|+ => Ok($name::$variant),)+
                    other => Err(TicketError::UnknownCode {
                        table: $table,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.name())
            }
        }
    };
}

lookup_table! {
    /// Station table
    Station, "station" {
        Bern = 1 => ["Bern"],
        Zurich = 2 => ["Zurich"],
        Lausanne = 3 => ["Lausanne"],
        Geneva = 4 => ["Geneva"],
        Basel = 5 => ["Basel"],
    }
}

lookup_table! {
    /// Travel class table
    TicketClass, "class" {
        First = 1 => ["1", "first"],
        Second = 2 => ["2", "second"],
    }
}

lookup_table! {
    /// Product table
    ProductType, "product_type" {
        Single = 1 => ["single"],
        DayPass = 2 => ["day-pass"],
        Supersaver = 3 => ["supersaver"],
    }
}

/// Ticket metadata as signed by the issuer. Immutable once issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketMetadata {
    pub origin: Station,
    pub destination: Station,
    /// Travel date as Unix epoch seconds
    pub date: i64,
    pub class: TicketClass,
    pub product_type: ProductType,
}

impl TicketMetadata {
    pub fn new(
        origin: Station,
        destination: Station,
        date: i64,
        class: TicketClass,
        product_type: ProductType,
    ) -> Result<Self> {
        let metadata = Self { origin, destination, date, class, product_type };
        metadata.validate()?;
        Ok(metadata)
    }

    /// Build from human-readable names, e.g. `("Bern", "Zurich", .., "2", "single")`
    pub fn from_names(
        origin: &str,
        destination: &str,
        date: i64,
        class: &str,
        product_type: &str,
    ) -> Result<Self> {
        Self::new(
            origin.parse()?,
            destination.parse()?,
            date,
            class.parse()?,
            product_type.parse()?,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.date < 0 {
            return Err(TicketError::Validation(format!("negative date: {}", self.date)));
        }
        if self.origin == self.destination {
            return Err(TicketError::Validation(format!(
                "origin and destination are both {}",
                self.origin
            )));
        }
        Ok(())
    }

    /// A departure must fall on the UTC day the ticket is dated for
    pub fn check_departure(&self, departure: DateTime<Utc>) -> Result<()> {
        let travel_day = Utc
            .timestamp_opt(self.date, 0)
            .single()
            .map(|date| date.date_naive())
            .ok_or_else(|| TicketError::Validation(format!("date out of range: {}", self.date)))?;

        if departure.date_naive() != travel_day {
            return Err(TicketError::Validation(format!(
                "departure {} is not on the ticket date {}",
                departure, travel_day
            )));
        }
        Ok(())
    }

    /// Field encoding in signing order `[origin, destination, date, class, product_type]`
    pub fn to_fields(&self) -> [FieldElement; METADATA_FIELDS] {
        [
            self.origin.to_field(),
            self.destination.to_field(),
            FieldElement::from_u64(self.date as u64),
            self.class.to_field(),
            self.product_type.to_field(),
        ]
    }

    /// Decode a field encoding; unknown codes fail instead of being coerced
    pub fn from_fields(fields: &[FieldElement; METADATA_FIELDS]) -> Result<Self> {
        let date = fields[2]
            .to_u64()
            .filter(|d| *d <= i64::MAX as u64)
            .ok_or_else(|| TicketError::Validation(format!("bad date field: {}", fields[2])))?;

        Ok(Self {
            origin: Station::from_field(&fields[0])?,
            destination: Station::from_field(&fields[1])?,
            date: date as i64,
            class: TicketClass::from_field(&fields[3])?,
            product_type: ProductType::from_field(&fields[4])?,
        })
    }
}

/// Inclusive validity window in Unix milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl ValidityWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self> {
        if end < start {
            return Err(TicketError::Validation(format!(
                "validity window ends before it starts ({} < {})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Window for a product departing at `departure`:
    /// single and supersaver tickets last two hours, a day pass lasts until
    /// the end of the departure day (UTC).
    pub fn for_product(departure: DateTime<Utc>, product: ProductType) -> Self {
        let end = match product {
            ProductType::Single | ProductType::Supersaver => departure + Duration::hours(2),
            ProductType::DayPass => {
                let last_instant = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
                    .unwrap_or(NaiveTime::MIN);
                Utc.from_utc_datetime(&departure.date_naive().and_time(last_instant))
            }
        };

        Self {
            start: departure.timestamp_millis(),
            end: end.timestamp_millis(),
        }
    }

    pub fn contains(&self, now: Timestamp) -> bool {
        self.start <= now && now <= self.end
    }

    pub fn check(&self, now: Timestamp) -> Result<()> {
        if now < self.start {
            return Err(TicketError::NotYetValid { start: self.start, now });
        }
        if now > self.end {
            return Err(TicketError::Expired { end: self.end, now });
        }
        Ok(())
    }
}
