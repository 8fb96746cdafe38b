use mintwatch_domain::decoder::{NULL_ADDRESS_TOPIC, TRANSFER_TOPIC};
use mintwatch_domain::{Address, RawLog};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::TransportError;

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<T> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: T,
}

impl<T> JsonRpcRequest<T> {
    pub fn new(id: u64, method: &'static str, params: T) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<T> {
    #[serde(default)]
    pub id: Option<u64>,
    pub result: Option<T>,
    pub error: Option<JsonRpcErrorObject>,
}

impl<T> JsonRpcResponse<T> {
    pub fn into_result(self) -> Result<T, TransportError> {
        if let Some(err) = self.error {
            return Err(TransportError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        self.result
            .ok_or_else(|| TransportError::InvalidResponse("missing result".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// `eth_subscription` push message.
#[derive(Debug, Deserialize)]
pub struct SubscriptionNotification {
    pub method: String,
    pub params: NotificationParams,
}

#[derive(Debug, Deserialize)]
pub struct NotificationParams {
    pub subscription: String,
    pub result: Value,
}

/// Log query for the watched contract's Transfer events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFilter {
    pub contract: Address,
    /// Narrow topic1 to the null address so the node only returns mints.
    /// The decoder still re-checks the source address.
    pub mints_only: bool,
}

impl LogFilter {
    pub fn mints(contract: Address) -> Self {
        Self {
            contract,
            mints_only: true,
        }
    }

    fn topics(&self) -> Value {
        if self.mints_only {
            json!([
                format!("{TRANSFER_TOPIC:#x}"),
                format!("{NULL_ADDRESS_TOPIC:#x}")
            ])
        } else {
            json!([format!("{TRANSFER_TOPIC:#x}")])
        }
    }

    /// Filter object for `eth_subscribe("logs", …)`.
    pub fn subscription_params(&self) -> Value {
        json!({
            "address": format!("{:#x}", self.contract),
            "topics": self.topics(),
        })
    }

    /// Filter object for `eth_getLogs` over an inclusive block range.
    pub fn range_params(&self, from: u64, to: u64) -> Value {
        json!({
            "address": format!("{:#x}", self.contract),
            "fromBlock": format!("{from:#x}"),
            "toBlock": format!("{to:#x}"),
            "topics": self.topics(),
        })
    }
}

/// Extracts the log carried by a push message addressed to `subscription`.
pub fn parse_notification(text: &str, subscription: &str) -> Option<Result<RawLog, String>> {
    let notification: SubscriptionNotification = serde_json::from_str(text).ok()?;
    if notification.method != "eth_subscription"
        || notification.params.subscription != subscription
    {
        return None;
    }
    Some(serde_json::from_value(notification.params.result).map_err(|err| err.to_string()))
}
