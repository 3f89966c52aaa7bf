// src/events.rs

use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount};

/// Notifications emitted by the exchange, in commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeEvent {
    /// A purchase settled.
    TokensPurchased {
        buyer: Address,
        usdt_amount: Amount,
        pusd_amount: Amount,
    },

    /// The owner swept the USDT balance.
    UsdtWithdrawn { to: Address, amount: Amount },

    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
}
