//! Callback tokens: the `action?key=value&key=value` strings carried in button payloads.
//!
//! Decoding is lenient and never panics: a missing `?` yields no parameters and pairs
//! without `=` are dropped. Consumers validate what they need through the `require_*`
//! helpers, which fail closed with a [`TokenError`].

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Telegram rejects `callback_data` longer than this many bytes.
pub const MAX_CALLBACK_DATA_LEN: usize = 64;

pub const MONTH: &str = "month";
pub const AMOUNT: &str = "amount";
pub const INVOICE_TYPE: &str = "invoiceType";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Buy,
    Sell,
    Direct,
    Payment,
    Start,
    Connect,
    Trial,
    ActivateTrial,
    Referral,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::Buy,
        Action::Sell,
        Action::Direct,
        Action::Payment,
        Action::Start,
        Action::Connect,
        Action::Trial,
        Action::ActivateTrial,
        Action::Referral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Direct => "direct",
            Action::Payment => "payment",
            Action::Start => "start",
            Action::Connect => "connect",
            Action::Trial => "trial",
            Action::ActivateTrial => "activate_trial",
            Action::Referral => "referral",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| TokenError::UnknownAction(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("unknown callback action '{0}'")]
    UnknownAction(String),
    #[error("callback parameter '{0}' is missing")]
    MissingParam(&'static str),
    #[error("callback parameter '{key}' has invalid value '{value}'")]
    InvalidParam { key: &'static str, value: String },
}

/// Ordered parameters. Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn require(&self, key: &'static str) -> Result<&str, TokenError> {
        self.get(key).ok_or(TokenError::MissingParam(key))
    }

    pub fn require_u32(&self, key: &'static str) -> Result<u32, TokenError> {
        let raw = self.require(key)?;
        raw.parse().map_err(|_| TokenError::InvalidParam {
            key,
            value: raw.to_string(),
        })
    }

    pub fn require_i64(&self, key: &'static str) -> Result<i64, TokenError> {
        let raw = self.require(key)?;
        raw.parse().map_err(|_| TokenError::InvalidParam {
            key,
            value: raw.to_string(),
        })
    }

    /// Absent is fine, present-but-garbage is not.
    pub fn optional_i64(&self, key: &'static str) -> Result<Option<i64>, TokenError> {
        match self.get(key) {
            None => Ok(None),
            Some(_) => self.require_i64(key).map(Some),
        }
    }
}

/// Parses the `k=v&k=v` tail of a token. Never fails.
pub fn parse_params(data: &str) -> Params {
    let mut params = Params::new();
    let Some((_, query)) = data.split_once('?') else {
        return params;
    };
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            params.insert(key, value);
        }
    }
    params
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackToken {
    pub action: Action,
    pub params: Params,
}

impl CallbackToken {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            params: Params::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.params.insert(key, value.to_string());
        self
    }

    pub fn encode(&self) -> String {
        let mut out = self.action.as_str().to_string();
        for (i, (key, value)) in self.params.iter().enumerate() {
            out.push(if i == 0 { '?' } else { '&' });
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }

    /// Only an action outside the closed set is an error; parameters are parsed leniently.
    pub fn decode(data: &str) -> Result<Self, TokenError> {
        let action = data.split_once('?').map_or(data, |(action, _)| action);
        Ok(Self {
            action: action.parse()?,
            params: parse_params(data),
        })
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_in_insertion_order() {
        let token = CallbackToken::new(Action::Payment)
            .with(MONTH, 3)
            .with(INVOICE_TYPE, "stripe")
            .with(AMOUNT, 1500);
        assert_eq!(token.encode(), "payment?month=3&invoiceType=stripe&amount=1500");
    }

    #[test]
    fn bare_action_has_no_query() {
        assert_eq!(CallbackToken::new(Action::Buy).encode(), "buy");
        let decoded = CallbackToken::decode("start").unwrap();
        assert_eq!(decoded.action, Action::Start);
        assert!(decoded.params.is_empty());
    }

    #[test]
    fn malformed_pairs_are_dropped() {
        let params = parse_params("sell?month=3&garbage&amount=&=x&&");
        assert_eq!(params.get(MONTH), Some("3"));
        assert_eq!(params.get(AMOUNT), Some(""));
        assert_eq!(params.get(""), Some("x"));
        assert_eq!(params.get("garbage"), None);
    }

    #[test]
    fn repeated_equals_stay_in_value() {
        let params = parse_params("sell?month==3=");
        assert_eq!(params.get(MONTH), Some("=3="));
    }

    #[test]
    fn later_duplicate_key_wins() {
        let params = parse_params("sell?month=1&month=12");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get(MONTH), Some("12"));
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert_eq!(
            CallbackToken::decode("refund?month=1"),
            Err(TokenError::UnknownAction("refund".into()))
        );
        assert!(CallbackToken::decode("").is_err());
    }

    #[test]
    fn require_fails_closed() {
        let params = parse_params("payment?month=abc");
        assert_eq!(
            params.require_u32(MONTH),
            Err(TokenError::InvalidParam {
                key: MONTH,
                value: "abc".into()
            })
        );
        assert_eq!(params.require_i64(AMOUNT), Err(TokenError::MissingParam(AMOUNT)));
        assert!(parse_params("payment?month=-1").require_u32(MONTH).is_err());
        assert_eq!(params.optional_i64(AMOUNT), Ok(None));
        assert!(parse_params("payment?amount=x").optional_i64(AMOUNT).is_err());
    }

    #[test]
    fn every_action_parses_from_its_name() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>(), Ok(action));
        }
    }
}
