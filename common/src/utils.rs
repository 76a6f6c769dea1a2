use crate::api::sui::MIST_PER_SUI;

// Turn a configured http(s) endpoint into its websocket form,
// leaving already-correct addresses untouched
pub fn sanitize_ws_address(target: &str) -> String {
    let mut address = target.to_lowercase();
    if address.starts_with("https://") {
        address = address.replacen("https://", "wss://", 1);
    } else if address.starts_with("http://") {
        address = address.replacen("http://", "ws://", 1);
    } else if !address.starts_with("ws://") && !address.starts_with("wss://") {
        address = format!("ws://{}", address);
    }

    if address.ends_with('/') {
        address.pop();
    }

    address
}

// Format an amount of MIST as a decimal SUI string
pub fn format_sui(mist: u64) -> String {
    format!(
        "{}.{:09}",
        mist / MIST_PER_SUI,
        mist % MIST_PER_SUI
    )
}
