use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: String,
    pub starting_balance: f64,
    pub currency: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSettingsInput {
    pub starting_balance: Option<f64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdjustmentKind {
    Deposit,
    Withdrawal,
    /// Absolute equity edit; amount is the signed change it caused
    Correction,
}

impl AdjustmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentKind::Deposit => "DEPOSIT",
            AdjustmentKind::Withdrawal => "WITHDRAWAL",
            AdjustmentKind::Correction => "CORRECTION",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "DEPOSIT" => Some(AdjustmentKind::Deposit),
            "WITHDRAWAL" => Some(AdjustmentKind::Withdrawal),
            "CORRECTION" => Some(AdjustmentKind::Correction),
            _ => None,
        }
    }

    /// Signed effect of `amount` on the starting balance.
    pub fn signed(&self, amount: f64) -> f64 {
        match self {
            AdjustmentKind::Deposit => amount.abs(),
            AdjustmentKind::Withdrawal => -amount.abs(),
            AdjustmentKind::Correction => amount,
        }
    }
}

/// Ledger entry for a deposit, withdrawal or equity correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceAdjustment {
    pub id: String,
    pub user_id: String,
    pub kind: AdjustmentKind,
    /// Signed delta applied to the starting balance
    pub amount: f64,
    pub note: Option<String>,
    pub created_at: i64,
}
