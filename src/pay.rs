//! Merchant payment requests and notifications
//!
//! Requests are flat XML documents built from a string parameter map and
//! signed with the merchant API key. Payment notifications are checked the
//! other way round before any field is trusted.

use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use serde::Deserialize;

use crate::crypto::nonce::NonceSource;
use crate::crypto::signature::{verify_pay_signature, SignType};
use crate::error::{CryptoError, WechatError};
use crate::fields::{self, cdata, escape_text, Fields};

/// `return_code` / `result_code` success value
pub const SUCCESS: &str = "SUCCESS";
/// `return_code` / `result_code` failure value
pub const FAIL: &str = "FAIL";

const NONCE_STR_LEN: usize = 32;

/// Merchant credentials
#[derive(Clone, Deserialize)]
pub struct PayConfig {
    pub appid: String,
    pub mch_id: String,
    pub api_key: String,
    #[serde(default)]
    pub sign_type: SignType,
}

impl fmt::Debug for PayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayConfig")
            .field("appid", &self.appid)
            .field("mch_id", &self.mch_id)
            .field("api_key", &"[REDACTED]")
            .field("sign_type", &self.sign_type)
            .finish()
    }
}

impl PayConfig {
    pub fn new(
        appid: impl Into<String>,
        mch_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            appid: appid.into(),
            mch_id: mch_id.into(),
            api_key: api_key.into(),
            sign_type: SignType::default(),
        }
    }

    pub fn with_sign_type(mut self, sign_type: SignType) -> Self {
        self.sign_type = sign_type;
        self
    }

    /// Sign `params` with this merchant's key and sign type.
    pub fn sign<I, K, V>(&self, params: I) -> Result<String, CryptoError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.sign_type.sign(&self.api_key, params)
    }

    /// Build a signed request body.
    ///
    /// `appid`, `mch_id`, `nonce_str` and `sign_type` are filled in when
    /// absent; an existing `sign` is kept. A `sign_type` already present in
    /// `params` selects the hash. Keys become element names and must be
    /// non-empty ASCII alphanumerics or `_`.
    pub fn request_body(
        &self,
        mut params: BTreeMap<String, String>,
        nonce: &dyn NonceSource,
    ) -> Result<String, CryptoError> {
        if let Some(key) = params.keys().find(|key| !is_param_name(key)) {
            return Err(CryptoError::InvalidParamName(key.clone()));
        }

        fill_default(&mut params, "appid", || self.appid.clone());
        fill_default(&mut params, "mch_id", || self.mch_id.clone());
        fill_default(&mut params, "nonce_str", || {
            nonce.random_string(NONCE_STR_LEN)
        });
        fill_default(&mut params, "sign_type", || {
            self.sign_type.as_str().to_string()
        });

        if params.get("sign").map_or(true, String::is_empty) {
            let sign_type: SignType = params["sign_type"].parse()?;
            let sign = sign_type.sign(&self.api_key, &params)?;
            params.insert("sign".to_string(), sign);
        }

        let mut body = String::from("<xml>");
        for (key, value) in params.iter().filter(|(_, v)| !v.is_empty()) {
            body.push_str(&format!("<{key}>{}</{key}>", escape_text(value)));
        }
        body.push_str("</xml>");

        Ok(body)
    }

    /// Parse and authenticate a payment notification.
    ///
    /// When `return_code` is `SUCCESS` the signature must verify and the
    /// `appid`/`mch_id` must belong to this merchant. Other notifications are
    /// returned as-is; check [`Notification::is_ok`] before acting on them.
    pub fn verify_notification(&self, body: &[u8]) -> Result<Notification, WechatError> {
        let fields = fields::read_fields(body)?;

        if fields.get("return_code") == Some(SUCCESS) {
            verify_pay_signature(&self.api_key, fields.iter()).map_err(|e| {
                debug!("[WechatPay] notification rejected: {}", e);
                e
            })?;

            if fields.get("appid") != Some(self.appid.as_str()) {
                return Err(WechatError::Signature("notification appid mismatch".to_string()));
            }
            if fields.get("mch_id") != Some(self.mch_id.as_str()) {
                return Err(WechatError::Signature(
                    "notification mch_id mismatch".to_string(),
                ));
            }
        }

        Notification::from_fields(&fields)
    }
}

fn is_param_name(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn fill_default(params: &mut BTreeMap<String, String>, key: &str, value: impl FnOnce() -> String) {
    let slot = params.entry(key.to_string()).or_default();
    if slot.is_empty() {
        *slot = value();
    }
}

/// Coupon applied to a payment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coupon {
    pub id: String,
    /// `CASH` or `NO_CASH`
    pub coupon_type: String,
    /// Amount in fen
    pub fee: i64,
}

/// Payment result notification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notification {
    pub return_code: String,
    pub return_msg: String,
    pub appid: String,
    pub mch_id: String,
    pub device_info: String,
    pub nonce_str: String,
    pub sign: String,
    pub sign_type: String,
    pub result_code: String,
    pub err_code: String,
    pub err_code_des: String,
    pub openid: String,
    pub is_subscribe: String,
    pub trade_type: String,
    pub bank_type: String,
    pub total_fee: i64,
    pub settlement_total_fee: i64,
    pub fee_type: String,
    pub cash_fee: i64,
    pub cash_fee_type: String,
    pub coupon_fee: i64,
    pub coupon_count: usize,
    pub coupons: Vec<Coupon>,
    pub transaction_id: String,
    pub out_trade_no: String,
    pub attach: String,
    /// `yyyyMMddHHmmss`
    pub time_end: String,
}

impl Notification {
    fn from_fields(fields: &Fields) -> Result<Self, WechatError> {
        let coupons = read_coupons(fields)?;
        let coupon_count: usize = fields.parse_or_default("coupon_count")?;
        if coupon_count != coupons.len() {
            return Err(WechatError::InvalidField {
                name: "coupon_count".to_string(),
                value: format!("{} (found {} coupons)", coupon_count, coupons.len()),
            });
        }

        Ok(Self {
            return_code: fields.string("return_code"),
            return_msg: fields.string("return_msg"),
            appid: fields.string("appid"),
            mch_id: fields.string("mch_id"),
            device_info: fields.string("device_info"),
            nonce_str: fields.string("nonce_str"),
            sign: fields.string("sign"),
            sign_type: fields.string("sign_type"),
            result_code: fields.string("result_code"),
            err_code: fields.string("err_code"),
            err_code_des: fields.string("err_code_des"),
            openid: fields.string("openid"),
            is_subscribe: fields.string("is_subscribe"),
            trade_type: fields.string("trade_type"),
            bank_type: fields.string("bank_type"),
            total_fee: fields.parse_or_default("total_fee")?,
            settlement_total_fee: fields.parse_or_default("settlement_total_fee")?,
            fee_type: fields.string("fee_type"),
            cash_fee: fields.parse_or_default("cash_fee")?,
            cash_fee_type: fields.string("cash_fee_type"),
            coupon_fee: fields.parse_or_default("coupon_fee")?,
            coupon_count,
            coupons,
            transaction_id: fields.string("transaction_id"),
            out_trade_no: fields.string("out_trade_no"),
            attach: fields.string("attach"),
            time_end: fields.string("time_end"),
        })
    }

    /// Communication succeeded (`return_code`).
    pub fn is_ok(&self) -> bool {
        self.return_code == SUCCESS
    }

    /// Payment succeeded (`return_code` and `result_code`).
    pub fn is_success(&self) -> bool {
        self.is_ok() && self.result_code == SUCCESS
    }

    pub fn subscribed(&self) -> bool {
        self.is_subscribe == "Y"
    }
}

/// Collect `coupon_{id,type,fee}_N` fields ordered by `N`.
fn read_coupons(fields: &Fields) -> Result<Vec<Coupon>, WechatError> {
    let mut coupons: BTreeMap<usize, Coupon> = BTreeMap::new();

    for (name, value) in fields.iter() {
        let Some((attr, index)) = coupon_attr(name) else {
            continue;
        };
        let coupon = coupons.entry(index).or_default();
        match attr {
            "id" => coupon.id = value.to_string(),
            "type" => coupon.coupon_type = value.to_string(),
            _ => {
                coupon.fee = value.trim().parse().map_err(|_| WechatError::InvalidField {
                    name: name.to_string(),
                    value: value.to_string(),
                })?
            }
        }
    }

    Ok(coupons.into_values().collect())
}

fn coupon_attr(name: &str) -> Option<(&'static str, usize)> {
    const ATTRS: [(&str, &str); 3] = [
        ("coupon_id_", "id"),
        ("coupon_type_", "type"),
        ("coupon_fee_", "fee"),
    ];

    ATTRS.iter().find_map(|(prefix, attr)| {
        name.strip_prefix(prefix)
            .and_then(|index| index.parse().ok())
            .map(|index| (*attr, index))
    })
}

/// Acknowledgement returned to the platform after a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyResponse {
    pub return_code: String,
    pub return_msg: String,
}

impl NotifyResponse {
    pub fn success() -> Self {
        Self {
            return_code: SUCCESS.to_string(),
            return_msg: "OK".to_string(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            return_code: FAIL.to_string(),
            return_msg: message.into(),
        }
    }

    pub fn to_xml(&self) -> String {
        format!(
            "<xml><return_code>{}</return_code><return_msg>{}</return_msg></xml>",
            cdata(&self.return_code),
            cdata(&self.return_msg)
        )
    }
}
