// Move-abort interpretation. The chain reports aborts as an opaque string
// of the shape
//   MoveAbort(MoveLocation { module: ModuleId { address: ..., name:
//   Identifier("clob_v2") }, function: 22, instruction: 45, .. }, 5) in
//   command 0
// We extract the module, the numeric code and the command index and map
// them through the per-version error-code tables so callers get a mnemonic
// instead of a number. For a batched insert the command index names the
// offending client order.

use super::ExchangeVersion;
use crate::error::ProxyError;
use lazy_static::lazy_static;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveAbort {
    pub module: String,
    pub code: u64,
    pub command: Option<usize>,
}

lazy_static! {
    static ref MOVE_ABORT_RE: Regex = Regex::new(
        r#"MoveAbort\(.*?Identifier\("([A-Za-z0-9_]+)"\).*?,\s*(\d+)\s*\)(?:\s+in\s+command\s+(\d+))?"#
    )
    .expect("move abort regex is valid");
}

pub fn try_parse_move_abort(error: &str) -> Option<MoveAbort> {
    let captures = MOVE_ABORT_RE.captures(error)?;
    let module = captures.get(1)?.as_str().to_string();
    let code = captures.get(2)?.as_str().parse().ok()?;
    let command = captures
        .get(3)
        .and_then(|index| index.as_str().parse().ok());
    Some(MoveAbort {
        module,
        code,
        command,
    })
}

fn v2_abort_name(module: &str, code: u64) -> Option<&'static str> {
    match (module, code) {
        ("clob_v2", 2) => Some("INVALID_FEE_RATE_REBATE_RATE"),
        ("clob_v2", 3) => Some("INVALID_ORDER_ID"),
        ("clob_v2", 4) => Some("UNAUTHORIZED_CANCEL"),
        ("clob_v2", 5) => Some("INVALID_PRICE"),
        ("clob_v2", 6) => Some("INVALID_QUANTITY"),
        ("clob_v2", 7) => Some("INSUFFICIENT_BASE_COIN"),
        ("clob_v2", 8) => Some("INSUFFICIENT_QUOTE_COIN"),
        ("clob_v2", 9) => Some("ORDER_CANNOT_BE_FULLY_FILLED"),
        ("clob_v2", 10) => Some("ORDER_CANNOT_BE_FULLY_PASSIVE"),
        ("clob_v2", 11) => Some("INVALID_TICK_PRICE"),
        ("clob_v2", 12) => Some("INVALID_USER"),
        ("clob_v2", 13) => Some("NOT_EQUAL"),
        ("clob_v2", 14) => Some("INVALID_RESTRICTION"),
        ("clob_v2", 16) => Some("INVALID_PAIR"),
        ("clob_v2", 18) => Some("INVALID_FEE"),
        ("clob_v2", 19) => Some("INVALID_EXPIRE_TIMESTAMP"),
        ("clob_v2", 20) => Some("INVALID_TICK_SIZE_LOT_SIZE"),
        ("clob_v2", 21) => Some("INVALID_SELF_MATCHING_PREVENTION_ARG"),
        ("balance", 2) => Some("INSUFFICIENT_BALANCE"),
        _ => None,
    }
}

fn v3_abort_name(module: &str, code: u64) -> Option<&'static str> {
    match (module, code) {
        ("order_info", 0) => Some("INVALID_PRICE"),
        ("order_info", 1) => Some("BELOW_MINIMUM_SIZE"),
        ("order_info", 2) => Some("INVALID_LOT_SIZE"),
        ("order_info", 3) => Some("INVALID_EXPIRE_TIMESTAMP"),
        ("order_info", 4) => Some("INVALID_ORDER_TYPE"),
        ("order_info", 5) => Some("POST_ONLY_CROSSES_ORDERBOOK"),
        ("order_info", 6) => Some("FOK_ORDER_CANNOT_BE_FULLY_FILLED"),
        ("order_info", 7) => Some("MARKET_ORDER_CANNOT_BE_POST_ONLY"),
        ("order_info", 8) => Some("INVALID_SELF_MATCHING_OPTION"),
        ("balance_manager", 0) => Some("INVALID_OWNER"),
        ("balance_manager", 1) => Some("INVALID_TRADER"),
        ("balance_manager", 2) => Some("INVALID_PROOF"),
        ("balance_manager", 3) => Some("INSUFFICIENT_FUNDS"),
        ("pool", 9) => Some("INVALID_FEE_TYPE"),
        ("state", 2) => Some("MAX_OPEN_ORDERS"),
        ("dynamic_field", 1) => Some("UNUSED_POOL"),
        _ => None,
    }
}

pub fn abort_name(version: ExchangeVersion, module: &str, code: u64) -> Option<&'static str> {
    match version {
        ExchangeVersion::V2 => v2_abort_name(module, code),
        // v3 extends the v2 tables with its own modules
        ExchangeVersion::V3 => v3_abort_name(module, code).or_else(|| v2_abort_name(module, code)),
    }
}

// Turn a raw execution failure into the most specific error we can name.
// `batch_client_order_ids` maps command indices of a bulk insert back to
// the order that caused the abort.
pub fn refine_execution_error(
    version: ExchangeVersion,
    error: &str,
    batch_client_order_ids: Option<&[String]>,
) -> ProxyError {
    if let Some(abort) = try_parse_move_abort(error) {
        if let Some(name) = abort_name(version, &abort.module, abort.code) {
            let client_order_id = abort.command.and_then(|command| {
                batch_client_order_ids
                    .and_then(|ids| ids.get(command))
                    .cloned()
            });
            return ProxyError::OnChainAbort {
                name: name.to_string(),
                message: error.to_string(),
                client_order_id,
            };
        }
    }
    ProxyError::Execution(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"MoveAbort(MoveLocation { module: ModuleId { address: dee9, name: Identifier("clob_v2") }, function: 22, instruction: 45, function_name: Some("place_limit_order") }, 5) in command 0"#;

    #[test]
    fn test_parse_is_total_on_well_formed_strings() {
        let abort = try_parse_move_abort(SAMPLE).unwrap();
        assert_eq!(abort.module, "clob_v2");
        assert_eq!(abort.code, 5);
        assert_eq!(abort.command, Some(0));
    }

    #[test]
    fn test_parse_without_command_index() {
        let error = r#"MoveAbort(MoveLocation { module: ModuleId { address: abc, name: Identifier("balance") }, function: 1, instruction: 2, function_name: None }, 2)"#;
        let abort = try_parse_move_abort(error).unwrap();
        assert_eq!(abort.module, "balance");
        assert_eq!(abort.code, 2);
        assert_eq!(abort.command, None);
    }

    #[test]
    fn test_parse_rejects_unrelated_errors() {
        assert!(try_parse_move_abort("InsufficientGas").is_none());
        assert!(try_parse_move_abort("connection reset by peer").is_none());
    }

    #[test]
    fn test_v2_table() {
        assert_eq!(
            abort_name(ExchangeVersion::V2, "clob_v2", 5),
            Some("INVALID_PRICE")
        );
        assert_eq!(
            abort_name(ExchangeVersion::V2, "clob_v2", 9),
            Some("ORDER_CANNOT_BE_FULLY_FILLED")
        );
        assert_eq!(
            abort_name(ExchangeVersion::V2, "balance", 2),
            Some("INSUFFICIENT_BALANCE")
        );
        // 15 and 17 are unassigned in the contract
        assert_eq!(abort_name(ExchangeVersion::V2, "clob_v2", 15), None);
        assert_eq!(abort_name(ExchangeVersion::V2, "clob_v2", 17), None);
    }

    #[test]
    fn test_v3_table_extends_v2() {
        assert_eq!(
            abort_name(ExchangeVersion::V3, "order_info", 5),
            Some("POST_ONLY_CROSSES_ORDERBOOK")
        );
        assert_eq!(
            abort_name(ExchangeVersion::V3, "balance_manager", 3),
            Some("INSUFFICIENT_FUNDS")
        );
        assert_eq!(
            abort_name(ExchangeVersion::V3, "state", 2),
            Some("MAX_OPEN_ORDERS")
        );
        assert_eq!(
            abort_name(ExchangeVersion::V3, "dynamic_field", 1),
            Some("UNUSED_POOL")
        );
        // v2 entries still resolve under v3
        assert_eq!(
            abort_name(ExchangeVersion::V3, "balance", 2),
            Some("INSUFFICIENT_BALANCE")
        );
    }

    #[test]
    fn test_refine_names_the_offending_batch_order() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let error = SAMPLE.replace("in command 0", "in command 2");
        match refine_execution_error(ExchangeVersion::V2, &error, Some(&ids)) {
            ProxyError::OnChainAbort {
                name,
                client_order_id,
                ..
            } => {
                assert_eq!(name, "INVALID_PRICE");
                assert_eq!(client_order_id.as_deref(), Some("c"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_refine_falls_back_to_execution_error() {
        let refined =
            refine_execution_error(ExchangeVersion::V2, "some unknown failure", None);
        assert!(matches!(refined, ProxyError::Execution(_)));

        // parsed but unmapped code
        let error = SAMPLE.replace(", 5)", ", 99)");
        let refined = refine_execution_error(ExchangeVersion::V2, &error, None);
        assert!(matches!(refined, ProxyError::Execution(_)));
    }
}
