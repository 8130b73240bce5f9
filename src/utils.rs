//! Identifier minting: uuid7 encoded as bech32 under a per-entity prefix

use bech32::Bech32m;
use uuid7::uuid7;

use crate::error::LedgerError;

pub const ACCOUNT_HRP: &str = "acct";
pub const PRODUCT_HRP: &str = "prod";
pub const CUSTOMER_HRP: &str = "cust";
pub const PARTNER_HRP: &str = "ptnr";
pub const ORDER_HRP: &str = "ord";
pub const LINE_HRP: &str = "line";
pub const LOAN_HRP: &str = "loan";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, LedgerError> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| LedgerError::IdEncoding(e.to_string()))?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| LedgerError::IdEncoding(e.to_string()))?;
    Ok(encode)
}

pub fn new_account_id() -> Result<String, LedgerError> {
    new_uuid_to_bech32(ACCOUNT_HRP)
}

pub fn new_product_id() -> Result<String, LedgerError> {
    new_uuid_to_bech32(PRODUCT_HRP)
}

pub fn new_customer_id() -> Result<String, LedgerError> {
    new_uuid_to_bech32(CUSTOMER_HRP)
}

pub fn new_partner_id() -> Result<String, LedgerError> {
    new_uuid_to_bech32(PARTNER_HRP)
}

pub fn new_order_id() -> Result<String, LedgerError> {
    new_uuid_to_bech32(ORDER_HRP)
}

pub fn new_line_id() -> Result<String, LedgerError> {
    new_uuid_to_bech32(LINE_HRP)
}

pub fn new_loan_id() -> Result<String, LedgerError> {
    new_uuid_to_bech32(LOAN_HRP)
}
