//! Sled-backed storage facade
//!
//! One named tree per entity table. Every key is `{account_id}/{entity_id}`
//! so reads, writes and prefix scans are account-scoped by construction;
//! a cross-account lookup simply misses. Multi-record atomicity goes
//! through sled's serializable multi-tree transactions.

use std::sync::Arc;

use sled::transaction::TransactionError;

use crate::error::LedgerError;

/// The tenant boundary. Always threaded explicitly through every
/// operation, never held as ambient state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct Store {
    _db: Arc<sled::Db>,
    pub products: sled::Tree,
    pub customers: sled::Tree,
    pub partners: sled::Tree,
    pub orders: sled::Tree,
    pub order_lines: sled::Tree,
    pub loans: sled::Tree,
}

impl Store {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, LedgerError> {
        Ok(Self {
            products: instance.open_tree("products")?,
            customers: instance.open_tree("customers")?,
            partners: instance.open_tree("partners")?,
            orders: instance.open_tree("orders")?,
            order_lines: instance.open_tree("order_lines")?,
            loans: instance.open_tree("loans")?,
            _db: instance,
        })
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, LedgerError> {
        Self::new(Arc::new(sled::open(path)?))
    }
}

pub fn record_key(account: &AccountId, id: &str) -> Vec<u8> {
    format!("{}/{}", account.as_str(), id).into_bytes()
}

pub fn account_prefix(account: &AccountId) -> Vec<u8> {
    format!("{}/", account.as_str()).into_bytes()
}

/// Order lines nest under their order: `{account}/{order_id}/{line_id}`.
/// A prefix scan on `{account}/{order_id}/` yields exactly one order's lines.
pub fn line_key(account: &AccountId, order_id: &str, line_id: &str) -> Vec<u8> {
    format!("{}/{}/{}", account.as_str(), order_id, line_id).into_bytes()
}

pub fn order_lines_prefix(account: &AccountId, order_id: &str) -> Vec<u8> {
    format!("{}/{}/", account.as_str(), order_id).into_bytes()
}

pub fn encode_record<T: minicbor::Encode<()>>(record: &T) -> Result<Vec<u8>, LedgerError> {
    Ok(minicbor::to_vec(record)?)
}

pub fn decode_record<'b, T: minicbor::Decode<'b, ()>>(bytes: &'b [u8]) -> Result<T, LedgerError> {
    Ok(minicbor::decode(bytes)?)
}

pub fn get_record<T>(tree: &sled::Tree, key: &[u8]) -> Result<Option<T>, LedgerError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(key)? {
        Some(bytes) => Ok(Some(decode_record(&bytes)?)),
        None => Ok(None),
    }
}

pub fn require_record<T>(tree: &sled::Tree, key: &[u8], id: &str) -> Result<T, LedgerError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    get_record(tree, key)?.ok_or_else(|| LedgerError::not_found(id))
}

pub fn put_record<T: minicbor::Encode<()>>(
    tree: &sled::Tree,
    key: &[u8],
    record: &T,
) -> Result<(), LedgerError> {
    tree.insert(key, encode_record(record)?)?;
    Ok(())
}

pub fn scan_records<T>(tree: &sled::Tree, prefix: &[u8]) -> Result<Vec<T>, LedgerError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    let mut records = Vec::new();
    for entry in tree.scan_prefix(prefix) {
        let (_, bytes) = entry?;
        records.push(decode_record(&bytes)?);
    }
    Ok(records)
}

/// Collect raw keys under a prefix, used to stage cascade deletes before
/// the removing transaction.
pub fn scan_keys(tree: &sled::Tree, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LedgerError> {
    let mut keys = Vec::new();
    for entry in tree.scan_prefix(prefix) {
        let (key, _) = entry?;
        keys.push(key.to_vec());
    }
    Ok(keys)
}

/// Map a transaction outcome back to the ledger's error type.
pub fn unabort<T>(
    res: sled::transaction::TransactionResult<T, LedgerError>,
) -> Result<T, LedgerError> {
    match res {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(LedgerError::Storage(err)),
    }
}
