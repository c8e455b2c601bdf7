use lazy_regex::regex;

pub mod cpu_ratio;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unable to parse the quantity: {0}")]
    QuantityParsing(String),
    #[error("Unknown suffix {1} in the quantity {0}")]
    UnknownSuffix(String, String),
}

fn suffix_multiplier(suffix: &str) -> Option<f64> {
    let multiplier = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => 1024.0_f64.powi(2),
        "Gi" => 1024.0_f64.powi(3),
        "Ti" => 1024.0_f64.powi(4),
        "Pi" => 1024.0_f64.powi(5),
        "Ei" => 1024.0_f64.powi(6),
        _ => return None,
    };
    Some(multiplier)
}

/// Parses a Kubernetes resource quantity (`500m`, `16Gi`, `1.5`, `2e3`)
/// into its value in base units.
pub fn parse_quantity(quantity: &str) -> Result<f64, Error> {
    let re = regex!(r"^([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)([a-zA-Z]*)$");

    let captures = re
        .captures(quantity.trim())
        .ok_or_else(|| Error::QuantityParsing(quantity.to_string()))?;
    let measure = captures
        .get(1)
        .ok_or_else(|| Error::QuantityParsing(quantity.to_string()))?
        .as_str()
        .parse::<f64>()
        .map_err(|_| Error::QuantityParsing(quantity.to_string()))?;
    let suffix = captures.get(2).map(|m| m.as_str()).unwrap_or_default();

    let multiplier = suffix_multiplier(suffix).ok_or_else(|| {
        Error::UnknownSuffix(quantity.to_string(), suffix.to_string())
    })?;

    // Dividing keeps decimal fractions such as 100m exact.
    if multiplier < 1.0 {
        Ok(measure / (1.0 / multiplier).round())
    } else {
        Ok(measure * multiplier)
    }
}

/// Implements a `serde_with` helper writing the quantity as a plain number
/// of `$unit`, and reading either such a number or a Kubernetes quantity.
macro_rules! impl_serialize_as {
    ($type:ty, $unit:ty, $parser:expr) => {
        use core::fmt;
        use serde::de::Visitor;
        use serde::{Deserializer, Serializer};

        pub struct Helper;

        impl serde_with::SerializeAs<$type> for Helper {
            fn serialize_as<S>(
                value: &$type,
                serializer: S,
            ) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_f64(value.get::<$unit>())
            }
        }

        impl<'de> serde_with::DeserializeAs<'de, $type> for Helper {
            fn deserialize_as<D>(deserializer: D) -> Result<$type, D::Error>
            where
                D: Deserializer<'de>,
            {
                deserializer.deserialize_any(CustomVisitor)
            }
        }

        pub struct CustomVisitor;

        impl<'de> Visitor<'de> for CustomVisitor {
            type Value = $type;

            fn expecting(
                &self,
                formatter: &mut fmt::Formatter,
            ) -> fmt::Result {
                write!(
                    formatter,
                    "a number of {} or a kubernetes quantity",
                    stringify!($unit)
                )
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(<$type>::new::<$unit>(v))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(<$type>::new::<$unit>(v as f64))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(<$type>::new::<$unit>(v as f64))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                $parser(v).map_err(|e| E::custom(e.to_string()))
            }
        }
    };
}

pub mod information {
    use super::{parse_quantity, Error};
    use uom::si::f64::Information;
    use uom::si::information::byte;

    /// Parses a memory quantity such as `16Gi` or `512M`.
    pub fn parse(quantity: &str) -> Result<Information, Error> {
        Ok(Information::new::<byte>(parse_quantity(quantity)?))
    }

    impl_serialize_as!(Information, byte, parse);
}

pub mod cpu {
    use super::cpu_ratio::cpu;
    use super::{parse_quantity, Error};
    use uom::si::f64::Ratio;

    /// Parses a CPU quantity such as `500m`, `2` or `250000n`.
    pub fn parse(quantity: &str) -> Result<Ratio, Error> {
        Ok(Ratio::new::<cpu>(parse_quantity(quantity)?))
    }

    impl_serialize_as!(Ratio, super::cpu_ratio::millicpu, parse);
}

#[cfg(test)]
mod tests {
    use super::cpu_ratio::{cpu as cpu_unit, millicpu, nanocpu};
    use super::*;
    use anyhow::Result;
    use serde::{Deserialize, Serialize};
    use serde_with::serde_as;
    use uom::si::f64::{Information, Ratio};
    use uom::si::information::{byte, gibibyte, mebibyte};
    use yare::parameterized;

    #[parameterized(
        plain = {"2", 2.0},
        fractional = {"1.5", 1.5},
        milli = {"500m", 0.5},
        milli_decimal = {"100m", 0.1},
        kilo = {"3k", 3000.0},
        kibi = {"4Ki", 4096.0},
        gibi = {"16Gi", 17_179_869_184.0},
        exponent = {"2e3", 2000.0},
        exa = {"1E", 1e18}
    )]
    fn test_parse_quantity(raw: &str, expected: f64) -> Result<()> {
        assert_eq!(parse_quantity(raw)?, expected);
        Ok(())
    }

    #[parameterized(
        empty = {""},
        no_digits = {"Gi"},
        unknown_suffix = {"12Zi"},
        spaced = {"1 2"}
    )]
    fn test_parse_quantity_rejects(raw: &str) {
        assert!(parse_quantity(raw).is_err());
    }

    #[test]
    fn test_cpu_units() -> Result<()> {
        assert_eq!(cpu::parse("1500m")?, Ratio::new::<millicpu>(1500.0));
        assert_eq!(cpu::parse("2")?, Ratio::new::<cpu_unit>(2.0));
        let usage = cpu::parse("250000000n")?;
        assert!((usage.get::<nanocpu>() - 250_000_000.0).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn test_information_units() -> Result<()> {
        assert_eq!(information::parse("2Gi")?, Information::new::<gibibyte>(2.0));
        assert_eq!(
            information::parse("512Mi")?,
            Information::new::<mebibyte>(512.0)
        );
        Ok(())
    }

    #[serde_as]
    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Sample {
        #[serde_as(as = "cpu::Helper")]
        cpus:   Ratio,
        #[serde_as(as = "information::Helper")]
        memory: Information,
    }

    #[test]
    fn test_serialize_as_numbers() -> Result<()> {
        let sample = Sample {
            cpus:   Ratio::new::<millicpu>(500.0),
            memory: Information::new::<byte>(1024.0),
        };
        assert_eq!(
            serde_json::to_string(&sample)?,
            r#"{"cpus":500.0,"memory":1024.0}"#
        );
        Ok(())
    }

    #[test]
    fn test_deserialize_from_quantity_strings() -> Result<()> {
        let sample: Sample =
            serde_json::from_str(r#"{"cpus":"2","memory":"1Ki"}"#)?;
        assert_eq!(sample.cpus, Ratio::new::<cpu_unit>(2.0));
        assert_eq!(sample.memory, Information::new::<byte>(1024.0));
        Ok(())
    }
}
