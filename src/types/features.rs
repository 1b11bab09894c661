//! Transaction feature vector consumed by the risk scorer

use serde::{Deserialize, Serialize};

/// Number of features the scaler and classifier were trained on.
pub const FEATURE_COUNT: usize = 15;

/// Feature names in the exact order expected by the model artifacts.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "amount",
    "oldbalanceOrg",
    "newbalanceOrig",
    "oldbalanceDest",
    "newbalanceDest",
    "time_diff",
    "balance_change_ratio",
    "amount_vs_median",
    "type__CASH_IN",
    "type__CASH_OUT",
    "type__DEBIT",
    "type__PAYMENT",
    "type__TRANSFER",
    "accountOrig",
    "accountDest",
];

/// Index of the first one-hot transaction type indicator
const TYPE_OFFSET: usize = 8;

/// Transaction type encoded by the `type__*` one-hot indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    CashIn,
    CashOut,
    Debit,
    Payment,
    Transfer,
}

impl TransactionType {
    /// All types, in one-hot column order
    pub const ALL: [TransactionType; 5] = [
        TransactionType::CashIn,
        TransactionType::CashOut,
        TransactionType::Debit,
        TransactionType::Payment,
        TransactionType::Transfer,
    ];

    fn column(self) -> usize {
        TYPE_OFFSET + self as usize
    }
}

/// Validated feature set for a single transaction.
///
/// Field names follow the Rust convention; the serialized names match the
/// request payload keys.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub amount: f64,

    #[serde(rename = "oldbalanceOrg")]
    pub old_balance_orig: f64,

    #[serde(rename = "newbalanceOrig")]
    pub new_balance_orig: f64,

    #[serde(rename = "oldbalanceDest")]
    pub old_balance_dest: f64,

    #[serde(rename = "newbalanceDest")]
    pub new_balance_dest: f64,

    /// Seconds since the sender's previous transaction
    pub time_diff: f64,

    /// Share of the origin balance moved by this transaction
    pub balance_change_ratio: f64,

    pub amount_vs_median: f64,

    #[serde(rename = "type__CASH_IN")]
    pub type_cash_in: f64,

    #[serde(rename = "type__CASH_OUT")]
    pub type_cash_out: f64,

    #[serde(rename = "type__DEBIT")]
    pub type_debit: f64,

    #[serde(rename = "type__PAYMENT")]
    pub type_payment: f64,

    #[serde(rename = "type__TRANSFER")]
    pub type_transfer: f64,

    /// Numeric encoding of the sender account
    #[serde(rename = "accountOrig")]
    pub account_orig: f64,

    /// Numeric encoding of the recipient account
    #[serde(rename = "accountDest")]
    pub account_dest: f64,
}

impl FeatureVector {
    /// Build a vector from values in [`FEATURE_NAMES`] order.
    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            amount: values[0],
            old_balance_orig: values[1],
            new_balance_orig: values[2],
            old_balance_dest: values[3],
            new_balance_dest: values[4],
            time_diff: values[5],
            balance_change_ratio: values[6],
            amount_vs_median: values[7],
            type_cash_in: values[8],
            type_cash_out: values[9],
            type_debit: values[10],
            type_payment: values[11],
            type_transfer: values[12],
            account_orig: values[13],
            account_dest: values[14],
        }
    }

    /// Values in [`FEATURE_NAMES`] order.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.amount,
            self.old_balance_orig,
            self.new_balance_orig,
            self.old_balance_dest,
            self.new_balance_dest,
            self.time_diff,
            self.balance_change_ratio,
            self.amount_vs_median,
            self.type_cash_in,
            self.type_cash_out,
            self.type_debit,
            self.type_payment,
            self.type_transfer,
            self.account_orig,
            self.account_dest,
        ]
    }

    /// Decode the one-hot type indicators.
    ///
    /// Returns `None` unless exactly one indicator equals 1 and the rest 0.
    pub fn transaction_type(&self) -> Option<TransactionType> {
        let values = self.to_array();
        let indicators = &values[TYPE_OFFSET..TYPE_OFFSET + TransactionType::ALL.len()];

        if indicators.iter().any(|&v| v != 0.0 && v != 1.0) {
            return None;
        }

        let mut hot = TransactionType::ALL
            .iter()
            .zip(indicators)
            .filter(|(_, &v)| v == 1.0)
            .map(|(&t, _)| t);

        match (hot.next(), hot.next()) {
            (Some(t), None) => Some(t),
            _ => None,
        }
    }

    /// Set the one-hot indicators for a single transaction type
    pub fn with_transaction_type(self, tx_type: TransactionType) -> Self {
        let mut values = self.to_array();
        for t in TransactionType::ALL {
            values[t.column()] = if t == tx_type { 1.0 } else { 0.0 };
        }
        Self::from_array(values)
    }
}
