use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ServiceError;

/// Physical dimension a unit measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Mass,
    Volume,
    Count,
}

/// Units handled by recipes, deliveries and dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "ml")]
    Millilitre,
    #[serde(rename = "L")]
    Litre,
    #[serde(rename = "pcs")]
    Piece,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Millilitre => "ml",
            Unit::Litre => "L",
            Unit::Piece => "pcs",
        }
    }

    pub fn dimension(&self) -> Dimension {
        match self {
            Unit::Gram | Unit::Kilogram => Dimension::Mass,
            Unit::Millilitre | Unit::Litre => Dimension::Volume,
            Unit::Piece => Dimension::Count,
        }
    }

    /// Multiplier into the dimension's base unit (g, ml, pcs)
    fn base_factor(&self) -> Decimal {
        match self {
            Unit::Kilogram | Unit::Litre => dec!(1000),
            Unit::Gram | Unit::Millilitre | Unit::Piece => Decimal::ONE,
        }
    }

    /// Parses a unit symbol, ignoring case and common aliases.
    pub fn parse(symbol: &str) -> Result<Self, ServiceError> {
        match symbol.trim().to_ascii_lowercase().as_str() {
            "g" | "gram" | "grams" => Ok(Unit::Gram),
            "kg" | "kgs" | "kilogram" | "kilograms" => Ok(Unit::Kilogram),
            "ml" | "millilitre" | "millilitres" => Ok(Unit::Millilitre),
            "l" | "ltr" | "litre" | "litres" => Ok(Unit::Litre),
            "pcs" | "pc" | "each" | "ea" | "unit" | "units" => Ok(Unit::Piece),
            other => Err(ServiceError::ValidationError(format!(
                "Unknown unit '{}'",
                other
            ))),
        }
    }

    pub fn is_compatible_with(&self, other: Unit) -> bool {
        self.dimension() == other.dimension()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Unit {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::parse(s)
    }
}

/// An amount together with its unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: Decimal,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: Decimal, unit: Unit) -> Self {
        Self { value, unit }
    }
}

/// Converts `value` from one unit to another within the same dimension.
pub fn convert(value: Decimal, from: Unit, to: Unit) -> Result<Quantity, ServiceError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ServiceError::ValidationError(format!(
            "Cannot convert negative quantity {}",
            value
        )));
    }

    if !from.is_compatible_with(to) {
        return Err(ServiceError::IncompatibleUnits {
            from: from.symbol().to_string(),
            to: to.symbol().to_string(),
        });
    }

    if from == to {
        return Ok(Quantity::new(value, to));
    }

    let converted = value
        .checked_mul(from.base_factor())
        .and_then(|base| base.checked_div(to.base_factor()))
        .ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Quantity {} {} is too large to convert to {}",
                value,
                from.symbol(),
                to.symbol()
            ))
        })?;
    Ok(Quantity::new(converted.normalize(), to))
}

/// Same as [`convert`] for units still in their stored string form.
pub fn convert_symbols(value: Decimal, from: &str, to: &str) -> Result<Quantity, ServiceError> {
    convert(value, Unit::parse(from)?, Unit::parse(to)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case(dec!(1), Unit::Kilogram, Unit::Gram, dec!(1000))]
    #[case(dec!(250), Unit::Gram, Unit::Kilogram, dec!(0.25))]
    #[case(dec!(1.5), Unit::Litre, Unit::Millilitre, dec!(1500))]
    #[case(dec!(750), Unit::Millilitre, Unit::Litre, dec!(0.75))]
    #[case(dec!(12), Unit::Piece, Unit::Piece, dec!(12))]
    #[case(dec!(0), Unit::Kilogram, Unit::Gram, dec!(0))]
    fn converts_within_dimension(
        #[case] value: Decimal,
        #[case] from: Unit,
        #[case] to: Unit,
        #[case] expected: Decimal,
    ) {
        let q = convert(value, from, to).unwrap();
        assert_eq!(q.value, expected);
        assert_eq!(q.unit, to);
    }

    #[test]
    fn overflowing_conversion_is_rejected() {
        assert_matches!(
            convert(Decimal::MAX, Unit::Kilogram, Unit::Gram),
            Err(ServiceError::ValidationError(_))
        );
        assert_eq!(
            convert(Decimal::MAX, Unit::Gram, Unit::Kilogram).unwrap().unit,
            Unit::Kilogram
        );
    }

    #[rstest]
    #[case(Unit::Kilogram, Unit::Millilitre)]
    #[case(Unit::Litre, Unit::Piece)]
    #[case(Unit::Piece, Unit::Gram)]
    fn rejects_cross_dimension(#[case] from: Unit, #[case] to: Unit) {
        assert_matches!(
            convert(dec!(1), from, to),
            Err(ServiceError::IncompatibleUnits { .. })
        );
    }

    #[rstest]
    #[case("KG", Unit::Kilogram)]
    #[case("kgs", Unit::Kilogram)]
    #[case("l", Unit::Litre)]
    #[case("L", Unit::Litre)]
    #[case("ltr", Unit::Litre)]
    #[case("each", Unit::Piece)]
    #[case("EA", Unit::Piece)]
    #[case(" ml ", Unit::Millilitre)]
    fn parses_aliases(#[case] symbol: &str, #[case] expected: Unit) {
        assert_eq!(Unit::parse(symbol).unwrap(), expected);
    }

    #[test]
    fn rejects_negative_and_unknown() {
        assert_matches!(
            convert(dec!(-1), Unit::Gram, Unit::Kilogram),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(Unit::parse("oz"), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn serializes_as_symbols() {
        assert_eq!(serde_json::to_string(&Unit::Litre).unwrap(), "\"L\"");
        assert_eq!(
            convert_symbols(dec!(2), "kg", "g").unwrap(),
            Quantity::new(dec!(2000), Unit::Gram)
        );
    }
}
