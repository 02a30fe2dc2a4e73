use serde::{Deserialize, Serialize};

/// Bytes per billed allocation unit
pub const BYTES_PER_KB: u64 = 1024;

/// 1e-8 of a 10^18-unit coin per KB
pub const DEFAULT_PRICE_PER_KB: u128 = 10_000_000_000;
/// 1e-12 of a 10^18-unit coin
pub const DEFAULT_MINIMUM_PAYMENT: u128 = 1_000_000;

/// Number of allocation units (KB, rounded up) needed to hold `size_bytes`
pub fn size_units(size_bytes: u64) -> u64 {
    size_bytes.div_ceil(BYTES_PER_KB)
}

/// What a given upload costs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostQuote {
    pub size_bytes: u64,
    pub size_units: u64,
    #[serde(with = "amount_string")]
    pub required_payment_units: u128,
}

/// Linear per-KB pricing with a minimum payment floor.
///
/// Amounts are integer base units of the ledger's currency, so
///  nothing here ever deals in floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostModel {
    #[serde(with = "amount_string")]
    pub price_per_kb: u128,
    #[serde(with = "amount_string")]
    pub minimum_payment: u128,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            price_per_kb: DEFAULT_PRICE_PER_KB,
            minimum_payment: DEFAULT_MINIMUM_PAYMENT,
        }
    }
}

impl CostModel {
    pub fn new(price_per_kb: u128, minimum_payment: u128) -> Self {
        Self {
            price_per_kb,
            minimum_payment,
        }
    }

    /// Quote the payment required to store `size_bytes`.
    ///  A zero byte upload still pays the floor.
    pub fn quote(&self, size_bytes: u64) -> CostQuote {
        let size_units = size_units(size_bytes);
        let cost = self.price_per_kb.saturating_mul(size_units as u128);
        CostQuote {
            size_bytes,
            size_units,
            required_payment_units: cost.max(self.minimum_payment),
        }
    }
}

/// Serde adapter for currency amounts.
///
/// Amounts are written as decimal strings since 128 bit integers do not
///  survive a trip through most JSON consumers. Plain integers are still
///  accepted on the way in, which keeps hand written TOML readable.
pub mod amount_string {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&amount.to_string())
    }

    struct AmountVisitor;

    impl Visitor<'_> for AmountVisitor {
        type Value = u128;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a non-negative integer amount or its decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(v as u128)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom("amount must not be negative"))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            v.trim().parse().map_err(E::custom)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(AmountVisitor)
    }
}
