//! Supported currencies and the major/minor unit conversion the gateway
//! protocol needs.

use payorch_sdk::objects::CurrencyCode;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurrencyError {
    #[error("unsupported currency: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount must be positive, got {0}")]
    NotPositive(Decimal),

    #[error("amount {amount} has more decimal places than {currency} allows")]
    TooPrecise { amount: Decimal, currency: Currency },

    #[error("amount {amount} does not fit into {currency} minor units")]
    Overflow { amount: Decimal, currency: Currency },
}

/// Currency for database operations and gateway calls.
///
/// This is the sqlx::Type version. For API/DTO use, see `payorch_sdk::objects::CurrencyCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "currency_code", rename_all = "UPPERCASE")]
pub enum Currency {
    Kzt,
    Usd,
    Rub,
    Eur,
}

impl Currency {
    pub const ALL: [Currency; 4] = [Currency::Kzt, Currency::Usd, Currency::Rub, Currency::Eur];

    /// ISO 4217 alphabetic code.
    pub const fn alpha(self) -> &'static str {
        match self {
            Currency::Kzt => "KZT",
            Currency::Usd => "USD",
            Currency::Rub => "RUB",
            Currency::Eur => "EUR",
        }
    }

    /// ISO 4217 numeric code, as sent to the gateway.
    pub const fn numeric(self) -> u16 {
        match self {
            Currency::Kzt => 398,
            Currency::Usd => 840,
            Currency::Rub => 643,
            Currency::Eur => 978,
        }
    }

    /// Number of decimal places of the minor unit.
    pub const fn exponent(self) -> u32 {
        match self {
            Currency::Kzt => 0,
            Currency::Usd | Currency::Rub | Currency::Eur => 2,
        }
    }

    pub fn from_numeric(code: u16) -> Option<Currency> {
        Currency::ALL.into_iter().find(|c| c.numeric() == code)
    }

    /// Converts a major-unit amount into gateway minor units.
    ///
    /// Half-way values round away from zero.
    pub fn to_minor_units(self, amount: Decimal) -> Result<i64, AmountError> {
        let overflow = || AmountError::Overflow {
            amount,
            currency: self,
        };
        let exponent = self.exponent();
        let scale = Decimal::from(10i64.pow(exponent));
        amount
            .round_dp_with_strategy(exponent, RoundingStrategy::MidpointAwayFromZero)
            .checked_mul(scale)
            .and_then(|minor| minor.to_i64())
            .ok_or_else(overflow)
    }

    /// Builds the major-unit amount from mantissa and scale, so no fraction
    /// is lost to integer division.
    pub fn from_minor_units(self, minor: i64) -> Decimal {
        Decimal::new(minor, self.exponent())
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.alpha())
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    /// Accepts the alphabetic code (`"USD"`) or the numeric one (`"840"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        if let Ok(numeric) = code.parse::<u16>() {
            return Currency::from_numeric(numeric)
                .ok_or_else(|| CurrencyError::Unsupported(s.to_string()));
        }
        Currency::ALL
            .into_iter()
            .find(|c| c.alpha().eq_ignore_ascii_case(code))
            .ok_or_else(|| CurrencyError::Unsupported(s.to_string()))
    }
}

impl From<Currency> for CurrencyCode {
    fn from(value: Currency) -> Self {
        match value {
            Currency::Kzt => CurrencyCode::KZT,
            Currency::Usd => CurrencyCode::USD,
            Currency::Rub => CurrencyCode::RUB,
            Currency::Eur => CurrencyCode::EUR,
        }
    }
}

impl From<CurrencyCode> for Currency {
    fn from(value: CurrencyCode) -> Self {
        match value {
            CurrencyCode::KZT => Currency::Kzt,
            CurrencyCode::USD => Currency::Usd,
            CurrencyCode::RUB => Currency::Rub,
            CurrencyCode::EUR => Currency::Eur,
        }
    }
}

/// A strictly positive major-unit amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(AmountError::NotPositive(value))
        }
    }

    pub fn value(self) -> Decimal {
        self.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

/// An amount together with its currency, as handed to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Money {
    pub amount: Amount,
    pub currency: Currency,
}

impl Money {
    /// Validates that the amount is a whole number of the currency's minor
    /// units, so the stored amount is exactly the one charged.
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self, AmountError> {
        let amount = Amount::new(amount)?;
        if amount.value().normalize().scale() > currency.exponent() {
            return Err(AmountError::TooPrecise {
                amount: amount.value(),
                currency,
            });
        }
        currency.to_minor_units(amount.value())?;
        Ok(Self { amount, currency })
    }

    pub fn minor_units(&self) -> Result<i64, AmountError> {
        self.currency.to_minor_units(self.amount.value())
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn two_decimal_currencies_round_trip_exactly() {
        for currency in [Currency::Usd, Currency::Rub, Currency::Eur] {
            assert_eq!(currency.to_minor_units(dec!(19.99)).unwrap(), 1999);
            assert_eq!(currency.from_minor_units(1999), dec!(19.99));
        }
    }

    #[test]
    fn kzt_has_no_minor_unit() {
        assert_eq!(Currency::Kzt.to_minor_units(dec!(19)).unwrap(), 19);
        assert_eq!(Currency::Kzt.from_minor_units(19), dec!(19));
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(Currency::Usd.to_minor_units(dec!(0.005)).unwrap(), 1);
        assert_eq!(Currency::Usd.to_minor_units(dec!(0.004)).unwrap(), 0);
        assert_eq!(Currency::Usd.to_minor_units(dec!(10.125)).unwrap(), 1013);
        assert_eq!(Currency::Kzt.to_minor_units(dec!(2.5)).unwrap(), 3);
    }

    #[test]
    fn does_not_lose_cents_on_the_way_back() {
        assert_eq!(Currency::Usd.from_minor_units(1), dec!(0.01));
        assert_eq!(Currency::Eur.from_minor_units(100_005), dec!(1000.05));
    }

    #[test]
    fn overflow_is_an_error() {
        let err = Currency::Usd.to_minor_units(Decimal::MAX).unwrap_err();
        assert!(matches!(err, AmountError::Overflow { .. }));
    }

    #[test]
    fn parses_alpha_and_numeric_codes() {
        assert_eq!("USD".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!("840".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!("398".parse::<Currency>().unwrap(), Currency::Kzt);
        assert_eq!("eur".parse::<Currency>().unwrap(), Currency::Eur);
        assert_eq!(
            "JPY".parse::<Currency>().unwrap_err(),
            CurrencyError::Unsupported("JPY".into())
        );
        assert!("392".parse::<Currency>().is_err());
        assert!("".parse::<Currency>().is_err());
    }

    #[test]
    fn amount_must_be_positive() {
        assert!(Amount::new(dec!(0.01)).is_ok());
        assert_eq!(Amount::new(dec!(0)), Err(AmountError::NotPositive(dec!(0))));
        assert_eq!(Amount::new(dec!(-5)), Err(AmountError::NotPositive(dec!(-5))));
    }

    #[test]
    fn money_rejects_fractions_of_a_minor_unit() {
        let err = Money::new(dec!(0.001), Currency::Usd).unwrap_err();
        assert!(matches!(err, AmountError::TooPrecise { .. }));
        assert!(matches!(
            Money::new(dec!(10.005), Currency::Usd),
            Err(AmountError::TooPrecise { .. })
        ));
        assert!(matches!(
            Money::new(dec!(19.5), Currency::Kzt),
            Err(AmountError::TooPrecise { .. })
        ));
        assert!(Money::new(dec!(0.4), Currency::Kzt).is_err());
        assert_eq!(
            Money::new(dec!(50.00), Currency::Usd).unwrap().minor_units().unwrap(),
            5000
        );
    }

    #[test]
    fn trailing_zeros_are_not_extra_precision() {
        assert_eq!(
            Money::new(dec!(19.000), Currency::Kzt).unwrap().minor_units().unwrap(),
            19
        );
        assert_eq!(
            Money::new(dec!(10.010), Currency::Eur).unwrap().minor_units().unwrap(),
            1001
        );
    }

    proptest! {
        #[test]
        fn cents_round_trip(cents in 1i64..=1_000_000_000_000) {
            for currency in [Currency::Usd, Currency::Rub, Currency::Eur] {
                let amount = Decimal::new(cents, 2);
                let minor = currency.to_minor_units(amount).unwrap();
                prop_assert_eq!(minor, cents);
                prop_assert_eq!(currency.from_minor_units(minor), amount);
            }
        }

        #[test]
        fn whole_tenge_round_trip(tenge in 1i64..=1_000_000_000_000) {
            let amount = Decimal::from(tenge);
            let minor = Currency::Kzt.to_minor_units(amount).unwrap();
            prop_assert_eq!(Currency::Kzt.from_minor_units(minor), amount);
        }

        #[test]
        fn numeric_code_parses_back(index in 0usize..4) {
            let currency = Currency::ALL[index];
            prop_assert_eq!(currency.numeric().to_string().parse::<Currency>().unwrap(), currency);
            prop_assert_eq!(currency.alpha().parse::<Currency>().unwrap(), currency);
        }
    }
}
