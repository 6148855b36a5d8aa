use crate::Result;
use crate::traits::Event;
use std::time::{Duration, Instant};

/// Longest single wait the agent will schedule.
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Deadline `budget` from now, capped at [`MAX_WAIT`].
pub fn deadline_after(budget: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(budget.min(MAX_WAIT)).unwrap_or(now)
}

/// Strips the `<N>` priority prefix the daemon puts on unsolicited lines.
pub fn strip_level(line: &str) -> &str {
    if line.starts_with('<') {
        if let Some(pos) = line.find('>') {
            return &line[pos + 1..];
        }
    }
    line
}

/// Matches an event line against a set of subscribed names.
/// Names are compared as prefixes after the priority marker; the first
/// name in `names` that matches wins.
pub fn match_event(line: &str, names: &[&str]) -> Option<Event> {
    let body = strip_level(line.trim_end_matches(['\r', '\n']));
    names
        .iter()
        .find(|name| body.starts_with(**name))
        .map(|name| Event {
            name: (*name).to_string(),
            line: body.to_string(),
        })
}

/// Reads `key=value` out of a multi-line `STATUS` style reply.
pub fn parse_status_field<'a>(reply: &'a str, key: &str) -> Option<&'a str> {
    reply.lines().find_map(|line| {
        line.split_once('=')
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.trim())
    })
}

/// Hex-encodes an ASCII string, as the test station exchanges URIs.
pub fn ascii_to_hex(s: &str) -> String {
    hex::encode(s.as_bytes())
}

/// Decodes a hex payload received from the test station.
pub fn hex_to_ascii(s: &str) -> Result<String> {
    let bytes = hex::decode(s.trim())?;
    Ok(String::from_utf8(bytes)?)
}

/// 将 IEEE 802.11 信道号转换为频率（MHz）
/// 支持 2.4 GHz 和 5 GHz 频段
pub fn channel_to_frequency(channel: u8) -> Option<u32> {
    match channel {
        // 公式: 2407 + (5 * channel)
        1..=13 => Some(2407 + 5 * channel as u32),
        // 日本特殊频道
        14 => Some(2484),
        36..=177 if channel % 4 == 0 || channel >= 149 => Some(5000 + 5 * channel as u32),
        _ => None,
    }
}

/// Converts an `<op_class>/<channel>` pair (`81/6`, `115/36`) to MHz.
pub fn op_class_channel_to_frequency(pair: &str) -> Option<u32> {
    let (op_class, channel) = pair.trim().split_once('/')?;
    let op_class: u8 = op_class.parse().ok()?;
    let channel: u8 = channel.parse().ok()?;
    match op_class {
        81 | 82 => channel_to_frequency(channel).filter(|f| *f < 5000),
        115..=130 => channel_to_frequency(channel).filter(|f| *f > 5000),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_match_after_priority_prefix() {
        let ev = match_event("<3>DPP-AUTH-SUCCESS init=1", &["DPP-NOT-COMPATIBLE", "DPP-AUTH-SUCCESS"])
            .unwrap();
        assert_eq!(ev.name, "DPP-AUTH-SUCCESS");
        assert_eq!(ev.line, "DPP-AUTH-SUCCESS init=1");
        assert!(match_event("<3>CTRL-EVENT-SCAN-RESULTS", &["DPP-AUTH-SUCCESS"]).is_none());
    }

    #[test]
    fn first_listed_name_wins_on_shared_prefix() {
        let ev = match_event("<3>DPP-TX-STATUS dst=x result=SUCCESS", &["DPP-TX-STATUS", "DPP-TX"]).unwrap();
        assert_eq!(ev.name, "DPP-TX-STATUS");
    }

    #[test]
    fn huge_budgets_are_capped() {
        let before = Instant::now();
        let deadline = deadline_after(Duration::from_secs(u64::MAX));
        assert!(deadline >= before + MAX_WAIT);
        assert!(deadline <= Instant::now() + MAX_WAIT);
        assert!(deadline_after(Duration::from_millis(10)) <= Instant::now() + Duration::from_millis(10));
    }

    #[test]
    fn status_field_lookup() {
        let reply = "bssid=00:11:22:33:44:55\naddress=02:00:00:00:00:01\nwpa_state=COMPLETED\n";
        assert_eq!(parse_status_field(reply, "address"), Some("02:00:00:00:00:01"));
        assert_eq!(parse_status_field(reply, "ip_address"), None);
    }

    #[test]
    fn hex_helpers() {
        assert_eq!(ascii_to_hex("DPPNET01"), "4450504e45543031");
        assert_eq!(hex_to_ascii("4450504e45543031").unwrap(), "DPPNET01");
        assert!(hex_to_ascii("zz").is_err());
    }

    #[test]
    fn channels_map_to_frequencies() {
        assert_eq!(channel_to_frequency(6), Some(2437));
        assert_eq!(channel_to_frequency(11), Some(2462));
        assert_eq!(channel_to_frequency(36), Some(5180));
        assert_eq!(channel_to_frequency(165), Some(5825));
        assert_eq!(channel_to_frequency(0), None);
        assert_eq!(op_class_channel_to_frequency("81/1"), Some(2412));
        assert_eq!(op_class_channel_to_frequency("115/36"), Some(5180));
        assert_eq!(op_class_channel_to_frequency("81/36"), None);
        assert_eq!(op_class_channel_to_frequency("garbage"), None);
    }
}
