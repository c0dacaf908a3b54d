//! Typed read-call descriptors.
//!
//! A call is a method plus parameters drawn from a closed set of encodings,
//! and the kind of result it is expected to produce. Shapes are checked
//! before anything goes on the wire.

use std::collections::BTreeMap;

use alloy_primitives::{hex, Address, Bytes, B256, U256};
use serde_json::{Map, Value};

use crate::error::CallError;
use crate::request::JsonRpcRequest;

/// Block selector accepted by state-reading methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockTag {
    #[default]
    Latest,
    Pending,
    Safe,
    Finalized,
    Earliest,
    Number(u64),
}

impl BlockTag {
    fn to_json(self) -> Value {
        match self {
            Self::Latest => "latest".into(),
            Self::Pending => "pending".into(),
            Self::Safe => "safe".into(),
            Self::Finalized => "finalized".into(),
            Self::Earliest => "earliest".into(),
            Self::Number(n) => format!("{n:#x}").into(),
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "latest" => Self::Latest,
            "pending" => Self::Pending,
            "safe" => Self::Safe,
            "finalized" => Self::Finalized,
            "earliest" => Self::Earliest,
            _ => return None,
        })
    }
}

/// One encoded parameter of a custom call.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Address(Address),
    Hash(B256),
    Data(Bytes),
    Quantity(U256),
    Block(BlockTag),
    Bool(bool),
    Object(BTreeMap<String, Param>),
}

impl Param {
    fn to_json(&self) -> Value {
        match self {
            Self::Address(a) => hex::encode_prefixed(a).into(),
            Self::Hash(h) => hex::encode_prefixed(h).into(),
            Self::Data(d) => hex::encode_prefixed(d).into(),
            Self::Quantity(q) => format!("0x{q:x}").into(),
            Self::Block(tag) => tag.to_json(),
            Self::Bool(b) => Value::Bool(*b),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if let Self::Object(fields) = self {
            for (key, value) in fields {
                if key.is_empty() {
                    return Err("object parameter has an empty key".into());
                }
                value.validate()?;
            }
        }
        Ok(())
    }
}

impl TryFrom<&Value> for Param {
    type Error = String;

    /// Classify a loosely typed JSON value: odd-length hex and numbers →
    /// quantity, 20-byte hex → address, 32-byte hex → hash, other even-length
    /// hex → data, block names → tag.
    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => n
                .as_u64()
                .map(|n| Self::Quantity(U256::from(n)))
                .ok_or_else(|| format!("number {n} is not an unsigned integer")),
            Value::String(s) => {
                if let Some(tag) = BlockTag::from_name(s) {
                    return Ok(Self::Block(tag));
                }
                let Some(digits) = s.strip_prefix("0x") else {
                    return Err(format!("string parameter {s:?} is not 0x-prefixed hex"));
                };
                // Quantities drop leading zeros, so only they come out odd.
                if digits.len() % 2 == 1 {
                    return U256::from_str_radix(digits, 16)
                        .map(Self::Quantity)
                        .map_err(|e| format!("bad quantity {s:?}: {e}"));
                }
                let bytes = hex::decode(digits).map_err(|e| format!("bad hex {s:?}: {e}"))?;
                Ok(match bytes.len() {
                    20 => Self::Address(Address::from_slice(&bytes)),
                    32 => Self::Hash(B256::from_slice(&bytes)),
                    _ => Self::Data(Bytes::from(bytes)),
                })
            }
            Value::Object(fields) => fields
                .iter()
                .map(|(k, v)| Param::try_from(v).map(|p| (k.clone(), p)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Self::Object),
            Value::Null => Err("null is not a valid parameter".into()),
            Value::Array(_) => Err("array parameters are not supported".into()),
        }
    }
}

/// What a call's result is decoded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// Hex quantity → `U256`.
    Quantity,
    /// Hex byte string → `Bytes`.
    Data,
    Bool,
    /// Passed through untouched.
    Json,
}

impl ResultKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Quantity => "quantity",
            Self::Data => "data",
            Self::Bool => "bool",
            Self::Json => "json",
        }
    }

    /// Decode a raw `result` member.
    pub fn decode(self, raw: Value) -> Result<RpcValue, CallError> {
        let fail = |reason: String| CallError::Decode {
            expected: self.name(),
            reason,
        };
        match self {
            Self::Json => Ok(RpcValue::Json(raw)),
            Self::Bool => raw
                .as_bool()
                .map(RpcValue::Bool)
                .ok_or_else(|| fail(format!("got {raw}"))),
            Self::Quantity => {
                let s = raw.as_str().ok_or_else(|| fail(format!("got {raw}")))?;
                let digits = s
                    .strip_prefix("0x")
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| fail(format!("{s:?} is not a 0x quantity")))?;
                U256::from_str_radix(digits, 16)
                    .map(RpcValue::Quantity)
                    .map_err(|e| fail(format!("{s:?}: {e}")))
            }
            Self::Data => {
                let s = raw.as_str().ok_or_else(|| fail(format!("got {raw}")))?;
                if !s.starts_with("0x") {
                    return Err(fail(format!("{s:?} is not 0x-prefixed")));
                }
                hex::decode(s)
                    .map(|b| RpcValue::Data(Bytes::from(b)))
                    .map_err(|e| fail(format!("{s:?}: {e}")))
            }
        }
    }
}

impl std::str::FromStr for ResultKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quantity" => Ok(Self::Quantity),
            "data" => Ok(Self::Data),
            "bool" => Ok(Self::Bool),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown result kind '{other}'")),
        }
    }
}

/// A decoded call result.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcValue {
    Quantity(U256),
    Data(Bytes),
    Bool(bool),
    Json(Value),
}

impl RpcValue {
    pub fn as_quantity(&self) -> Option<U256> {
        match self {
            Self::Quantity(q) => Some(*q),
            _ => None,
        }
    }

    /// Quantity narrowed to `u64`, if it fits.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_quantity().and_then(|q| u64::try_from(q).ok())
    }

    pub fn as_data(&self) -> Option<&Bytes> {
        match self {
            Self::Data(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for RpcValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quantity(q) => write!(f, "{q}"),
            Self::Data(d) => write!(f, "{}", hex::encode_prefixed(d)),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// A read call against one network.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcCall {
    BlockNumber,
    ChainId,
    GasPrice,
    GetBalance {
        address: Address,
        block: BlockTag,
    },
    GetTransactionCount {
        address: Address,
        block: BlockTag,
    },
    GetCode {
        address: Address,
        block: BlockTag,
    },
    GetStorageAt {
        address: Address,
        slot: B256,
        block: BlockTag,
    },
    /// `eth_call` with pre-encoded calldata.
    Call {
        to: Address,
        data: Bytes,
        block: BlockTag,
    },
    GetBlockByNumber {
        block: BlockTag,
        full_transactions: bool,
    },
    /// Any other read method.
    Custom {
        method: String,
        params: Vec<Param>,
        expect: ResultKind,
    },
}

/// Method prefixes that sign or broadcast; not accepted as custom calls.
const WRITE_PREFIXES: &[&str] = &["eth_send", "eth_sign", "personal_"];

impl RpcCall {
    /// `eth_call` against `to` at the latest block.
    pub fn eth_call(to: Address, data: impl Into<Bytes>) -> Self {
        Self::Call {
            to,
            data: data.into(),
            block: BlockTag::Latest,
        }
    }

    pub fn custom(method: impl Into<String>, params: Vec<Param>, expect: ResultKind) -> Self {
        Self::Custom {
            method: method.into(),
            params,
            expect,
        }
    }

    pub fn method(&self) -> &str {
        match self {
            Self::BlockNumber => "eth_blockNumber",
            Self::ChainId => "eth_chainId",
            Self::GasPrice => "eth_gasPrice",
            Self::GetBalance { .. } => "eth_getBalance",
            Self::GetTransactionCount { .. } => "eth_getTransactionCount",
            Self::GetCode { .. } => "eth_getCode",
            Self::GetStorageAt { .. } => "eth_getStorageAt",
            Self::Call { .. } => "eth_call",
            Self::GetBlockByNumber { .. } => "eth_getBlockByNumber",
            Self::Custom { method, .. } => method,
        }
    }

    pub fn expect(&self) -> ResultKind {
        match self {
            Self::BlockNumber
            | Self::ChainId
            | Self::GasPrice
            | Self::GetBalance { .. }
            | Self::GetTransactionCount { .. } => ResultKind::Quantity,
            Self::GetCode { .. } | Self::GetStorageAt { .. } | Self::Call { .. } => ResultKind::Data,
            Self::GetBlockByNumber { .. } => ResultKind::Json,
            Self::Custom { expect, .. } => *expect,
        }
    }

    pub fn params(&self) -> Vec<Value> {
        match self {
            Self::BlockNumber | Self::ChainId | Self::GasPrice => vec![],
            Self::GetBalance { address, block }
            | Self::GetTransactionCount { address, block }
            | Self::GetCode { address, block } => vec![
                Param::Address(*address).to_json(),
                block.to_json(),
            ],
            Self::GetStorageAt {
                address,
                slot,
                block,
            } => vec![
                Param::Address(*address).to_json(),
                Param::Hash(*slot).to_json(),
                block.to_json(),
            ],
            Self::Call { to, data, block } => {
                let mut tx = Map::new();
                tx.insert("to".into(), Param::Address(*to).to_json());
                tx.insert("data".into(), Param::Data(data.clone()).to_json());
                vec![Value::Object(tx), block.to_json()]
            }
            Self::GetBlockByNumber {
                block,
                full_transactions,
            } => vec![block.to_json(), Value::Bool(*full_transactions)],
            Self::Custom { params, .. } => params.iter().map(Param::to_json).collect(),
        }
    }

    /// Check the call can be sent. Typed variants are valid by construction;
    /// custom calls need a read-only method name and well-formed parameters.
    pub fn validate(&self) -> Result<(), String> {
        let Self::Custom { method, params, .. } = self else {
            return Ok(());
        };
        let mut chars = method.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => {}
            _ => return Err(format!("method name {method:?} must start with a letter")),
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("method name {method:?} has invalid characters"));
        }
        if WRITE_PREFIXES.iter().any(|p| method.starts_with(p)) {
            return Err(format!("{method} is not a read-only method"));
        }
        params.iter().try_for_each(Param::validate)
    }

    /// Wire request carrying correlation id `id`.
    pub fn to_request(&self, id: u64) -> JsonRpcRequest {
        JsonRpcRequest::new(id, self.method(), self.params())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use serde_json::json;

    const TOKEN: Address = address!("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");

    #[test]
    fn balance_params_encode_address_and_tag() {
        let call = RpcCall::GetBalance {
            address: TOKEN,
            block: BlockTag::Number(255),
        };
        assert_eq!(
            call.params(),
            vec![json!("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"), json!("0xff")]
        );
        assert_eq!(call.expect(), ResultKind::Quantity);
    }

    #[test]
    fn eth_call_builds_transaction_object() {
        let call = RpcCall::eth_call(TOKEN, vec![0x18, 0x16, 0x0d, 0xdd]);
        let req = call.to_request(7);
        assert_eq!(req.method, "eth_call");
        assert_eq!(req.params[0]["data"], "0x18160ddd");
        assert_eq!(req.params[1], "latest");
        assert_eq!(req.id, crate::request::RpcId::Number(7));
    }

    #[test]
    fn quantity_decodes_large_values() {
        let v = ResultKind::Quantity
            .decode(json!("0xffffffffffffffffffffffffffffffff01"))
            .unwrap();
        assert!(v.as_quantity().unwrap() > U256::from(u128::MAX));
        assert_eq!(v.as_u64(), None);
    }

    #[test]
    fn quantity_rejects_garbage() {
        for raw in [json!("0x"), json!("12"), json!("0xzz"), json!(null), json!(5)] {
            let err = ResultKind::Quantity.decode(raw).unwrap_err();
            assert!(matches!(err, CallError::Decode { expected: "quantity", .. }));
        }
    }

    #[test]
    fn data_decodes_hex() {
        let v = ResultKind::Data.decode(json!("0x0102")).unwrap();
        assert_eq!(v.as_data().unwrap().to_vec(), vec![1u8, 2]);
        assert!(ResultKind::Data.decode(json!("0x0")).is_err());
    }

    #[test]
    fn custom_write_methods_are_rejected() {
        let call = RpcCall::custom("eth_sendRawTransaction", vec![], ResultKind::Data);
        assert!(call.validate().is_err());
        let call = RpcCall::custom("eth get", vec![], ResultKind::Json);
        assert!(call.validate().is_err());
        let call = RpcCall::custom("", vec![], ResultKind::Json);
        assert!(call.validate().is_err());
    }

    #[test]
    fn odd_length_block_number_round_trips_to_wire() {
        let params = [json!("0x1b4"), json!(false)]
            .iter()
            .map(Param::try_from)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let call = RpcCall::custom("eth_getBlockByNumber", params, ResultKind::Json);
        assert!(call.validate().is_ok());
        assert_eq!(call.params(), vec![json!("0x1b4"), json!(false)]);
    }

    #[test]
    fn custom_object_keys_must_be_named() {
        let mut fields = BTreeMap::new();
        fields.insert(String::new(), Param::Bool(true));
        let call = RpcCall::custom("eth_estimateGas", vec![Param::Object(fields)], ResultKind::Quantity);
        assert!(call.validate().is_err());
    }

    #[test]
    fn params_classified_from_json() {
        let addr = Param::try_from(&json!("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48")).unwrap();
        assert_eq!(addr, Param::Address(TOKEN));
        assert_eq!(Param::try_from(&json!("latest")).unwrap(), Param::Block(BlockTag::Latest));
        assert_eq!(Param::try_from(&json!(16)).unwrap(), Param::Quantity(U256::from(16)));
        assert!(matches!(Param::try_from(&json!("0x01")).unwrap(), Param::Data(_)));
        assert_eq!(Param::try_from(&json!("0x1b4")).unwrap(), Param::Quantity(U256::from(436)));
        assert_eq!(Param::try_from(&json!("0x0")).unwrap(), Param::Quantity(U256::ZERO));
        assert_eq!(Param::try_from(&json!("0x1")).unwrap(), Param::Quantity(U256::from(1)));
        assert!(Param::try_from(&json!("0x1g4")).is_err());
        assert!(Param::try_from(&json!([1])).is_err());
        assert!(Param::try_from(&json!("hello")).is_err());
    }
}
