// Withdrawal whitelist: a JSON resource file mapping chain name -> token ->
// permitted recipient addresses, loaded once at startup. Withdrawals to any
// address outside the list are refused.

use crate::error::{ProxyError, ProxyResult};
use dex_common::crypto::SuiAddress;
use log::info;
use serde::Deserialize;
use std::{collections::HashMap, path::Path};

#[derive(Debug, Default, Deserialize)]
pub struct WithdrawWhitelist {
    #[serde(flatten)]
    chains: HashMap<String, HashMap<String, Vec<SuiAddress>>>,
}

impl WithdrawWhitelist {
    // Missing path means an empty whitelist: every withdrawal is refused
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> ProxyResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ProxyError::Startup(format!(
                "cannot read withdrawal whitelist {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let whitelist: Self = serde_json::from_str(&content)
            .map_err(|e| ProxyError::Startup(format!("invalid withdrawal whitelist: {}", e)))?;
        info!(
            "withdrawal whitelist loaded for {} chains",
            whitelist.chains.len()
        );
        Ok(whitelist)
    }

    pub fn check(
        &self,
        chain_name: &str,
        token: &str,
        recipient: SuiAddress,
    ) -> ProxyResult<()> {
        let allowed = self
            .chains
            .get(chain_name)
            .and_then(|tokens| tokens.get(token))
            .map(|recipients| recipients.contains(&recipient))
            .unwrap_or(false);
        if allowed {
            Ok(())
        } else {
            Err(ProxyError::Unauthorised(format!(
                "{} for token {}",
                recipient, token
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitelist() -> WithdrawWhitelist {
        serde_json::from_str(
            r#"{
                "sui": {
                    "0x2::sui::SUI": ["0xaa", "0xbb"],
                    "0xdeep::deep::DEEP": ["0xcc"]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_whitelisted_recipient_passes() {
        let list = whitelist();
        assert!(list
            .check("sui", "0x2::sui::SUI", "0xaa".parse().unwrap())
            .is_ok());
        assert!(list
            .check("sui", "0xdeep::deep::DEEP", "0xcc".parse().unwrap())
            .is_ok());
    }

    #[test]
    fn test_unlisted_recipient_token_or_chain_fails() {
        let list = whitelist();
        assert!(matches!(
            list.check("sui", "0x2::sui::SUI", "0xcc".parse().unwrap()),
            Err(ProxyError::Unauthorised(_))
        ));
        assert!(matches!(
            list.check("sui", "0xother::t::T", "0xaa".parse().unwrap()),
            Err(ProxyError::Unauthorised(_))
        ));
        assert!(matches!(
            list.check("other", "0x2::sui::SUI", "0xaa".parse().unwrap()),
            Err(ProxyError::Unauthorised(_))
        ));
    }

    #[test]
    fn test_empty_whitelist_refuses_everything() {
        let list = WithdrawWhitelist::load::<&str>(None).unwrap();
        assert!(list
            .check("sui", "0x2::sui::SUI", "0xaa".parse().unwrap())
            .is_err());
    }
}
