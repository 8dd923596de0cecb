//! Parsing of the `trace_pipe` lines written by the netlog attach points.
//!
//! ```text
//!  curl-4242 [003] d..1. 1234.567890: stream_connect: (__sys_connect_file+0x6b/0xa0 <- inet_stream_connect) family=2 proto=6 ...
//! ```

use std::{
    collections::HashMap,
    net::{Ipv4Addr, Ipv6Addr},
};

use probe_common::AttachPoint;

use crate::raw::RawSocketEvent;

/// Parse one line, `None` if it's not a well formed netlog event.
pub fn parse_line(line: &str) -> Option<RawSocketEvent> {
    let (header, point, rest) = split_event(line)?;
    let pid = parse_pid(header)?;

    let args: HashMap<&str, &str> = rest
        .split_whitespace()
        .filter_map(|token| token.split_once('='))
        .collect();
    let num = |key: &str| args.get(key).and_then(|value| parse_num(value));
    let array = |key: &str| args.get(key).and_then(|value| parse_array(value));

    Some(RawSocketEvent {
        point,
        pid,
        family: num("family")?.try_into().ok()?,
        protocol: num("proto")?.try_into().ok()?,
        sport: num("sport")?.try_into().ok()?,
        // skc_dport is stored in network byte order
        dport: u16::from_be_bytes(u16::try_from(num("dport")?).ok()?.to_ne_bytes()),
        saddr: Ipv4Addr::from(u32::try_from(num("saddr")?).ok()?.to_ne_bytes()),
        daddr: Ipv4Addr::from(u32::try_from(num("daddr")?).ok()?.to_ne_bytes()),
        saddr6: Ipv6Addr::from(array("saddr6")?),
        daddr6: Ipv6Addr::from(array("daddr6")?),
        ret: match args.get("ret") {
            Some(value) => value.parse().ok()?,
            None => 0,
        },
    })
}

/// Split a line in the header, the event and its arguments.
fn split_event(line: &str) -> Option<(&str, AttachPoint, &str)> {
    // the task name may contain ": " too
    line.match_indices(": ").find_map(|(at, sep)| {
        let rest = &line[at + sep.len()..];
        let (name, args) = rest.split_once(": ")?;
        let point = name.parse().ok()?;
        Some((&line[..at], point, args))
    })
}

/// `<comm>-<pid> [(<tgid>)] [<cpu>] <flags> <timestamp>`
fn parse_pid(header: &str) -> Option<i32> {
    let task = header[..header.rfind(" [")?].trim_end();
    let task = match task.strip_suffix(')') {
        Some(with_tgid) => with_tgid[..with_tgid.rfind('(')?].trim_end(),
        None => task,
    };
    task.rsplit_once('-')?.1.parse().ok()
}

fn parse_num(value: &str) -> Option<u64> {
    match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// `{0x0,0x1,...}`
fn parse_array(value: &str) -> Option<[u8; 16]> {
    let items = value.strip_prefix('{')?.strip_suffix('}')?;
    let mut bytes = [0; 16];
    let mut count = 0;
    for item in items.split(',') {
        *bytes.get_mut(count)? = parse_num(item)?.try_into().ok()?;
        count += 1;
    }
    (count == bytes.len()).then_some(bytes)
}
