// Serde projections of the Sui JSON-RPC wire shapes the gateway touches.
// Only the fields we actually read are modelled; everything else is ignored
// on deserialization and omitted on serialization.

use crate::{
    crypto::{Digest, ObjectId, SuiAddress, TransactionDigest},
    time::TimestampMillis,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub const SUI_COIN_TYPE: &str = "0x2::sui::SUI";
pub const MIST_PER_SUI: u64 = 1_000_000_000;

// Object versions are plain integers in effects but decimal strings in
// object/coin reads; accept both, emit strings
pub mod string_u64 {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum NumberOrString {
            Number(u64),
            String(String),
        }
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

pub mod string_u64_opt {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wrapper {
            Number(u64),
            String(String),
        }
        let value: Option<Wrapper> = Option::deserialize(deserializer)?;
        match value {
            None => Ok(None),
            Some(Wrapper::Number(n)) => Ok(Some(n)),
            Some(Wrapper::String(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}

pub type SequenceNumber = u64;

// (id, version, digest) triple referencing one exact state of an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiObjectRef {
    pub object_id: ObjectId,
    #[serde(with = "string_u64")]
    pub version: SequenceNumber,
    pub digest: Digest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coin {
    pub coin_type: String,
    pub coin_object_id: ObjectId,
    #[serde(with = "string_u64")]
    pub version: SequenceNumber,
    pub digest: Digest,
    #[serde(with = "string_u64")]
    pub balance: u64,
}

impl Coin {
    pub fn object_ref(&self) -> SuiObjectRef {
        SuiObjectRef {
            object_id: self.coin_object_id,
            version: self.version,
            digest: self.digest.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinPage {
    pub data: Vec<Coin>,
    #[serde(default)]
    pub next_cursor: Option<ObjectId>,
    #[serde(default)]
    pub has_next_page: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceInfo {
    pub coin_type: String,
    pub coin_object_count: usize,
    #[serde(with = "string_u64")]
    pub total_balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectData {
    pub object_id: ObjectId,
    #[serde(with = "string_u64")]
    pub version: SequenceNumber,
    pub digest: Digest,
    // Move struct content, requested with showContent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ObjectData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ObjectResponse {
    pub fn into_data(self) -> Option<ObjectData> {
        self.data
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatusKind {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub status: ExecutionStatusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionStatus {
    pub fn is_ok(&self) -> bool {
        self.status == ExecutionStatusKind::Success
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasCostSummary {
    #[serde(with = "string_u64")]
    pub computation_cost: u64,
    #[serde(with = "string_u64")]
    pub storage_cost: u64,
    #[serde(with = "string_u64")]
    pub storage_rebate: u64,
    #[serde(with = "string_u64", default)]
    pub non_refundable_storage_fee: u64,
}

impl GasCostSummary {
    // Signed net cost charged to the gas coin
    pub fn net_gas_usage(&self) -> i128 {
        self.computation_cost as i128 + self.storage_cost as i128 - self.storage_rebate as i128
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedObjectRef {
    pub reference: SuiObjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEffects {
    pub status: ExecutionStatus,
    pub gas_used: GasCostSummary,
    pub gas_object: OwnedObjectRef,
    #[serde(with = "string_u64", default)]
    pub executed_epoch: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub created: Vec<OwnedObjectRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mutated: Vec<OwnedObjectRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventId {
    pub tx_digest: TransactionDigest,
    #[serde(with = "string_u64")]
    pub event_seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiEvent {
    pub id: EventId,
    pub package_id: ObjectId,
    pub transaction_module: String,
    pub sender: SuiAddress,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub parsed_json: Value,
    #[serde(default, with = "string_u64_opt", skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<TimestampMillis>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub data: Vec<SuiEvent>,
    #[serde(default)]
    pub next_cursor: Option<EventId>,
    #[serde(default)]
    pub has_next_page: bool,
}

// Server-side event filters for suix_queryEvents / suix_subscribeEvent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventFilter {
    Sender(SuiAddress),
    MoveEventField {
        path: String,
        value: Value,
    },
    #[serde(rename_all = "camelCase")]
    TimeRange {
        #[serde(with = "string_u64")]
        start_time: TimestampMillis,
        #[serde(with = "string_u64")]
        end_time: TimestampMillis,
    },
    Any(Vec<EventFilter>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBlockResponse {
    pub digest: TransactionDigest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<TransactionEffects>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SuiEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_local_execution: Option<bool>,
    #[serde(default, with = "string_u64_opt", skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<TimestampMillis>,
}

impl TransactionBlockResponse {
    pub fn execution_error(&self) -> Option<&str> {
        self.effects
            .as_ref()
            .and_then(|effects| effects.status.error.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBlockResponseOptions {
    #[serde(default)]
    pub show_effects: bool,
    #[serde(default)]
    pub show_events: bool,
    #[serde(default)]
    pub show_object_changes: bool,
}

impl TransactionBlockResponseOptions {
    pub fn effects_and_events() -> Self {
        Self {
            show_effects: true,
            show_events: true,
            show_object_changes: false,
        }
    }
}

// Result of the unsafe_* transaction builders: ready-to-sign bytes plus the
// gas payment the builder resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBlockBytes {
    pub tx_bytes: String,
    #[serde(default)]
    pub gas: Vec<SuiObjectRef>,
}

// Dynamic field key, used to read per-coin balances off a balance manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicFieldName {
    #[serde(rename = "type")]
    pub type_: String,
    pub value: Value,
}
