//! Directory database parsing.
//!
//! Pure lookups over the textual host databases (`hosts`, `protocols`,
//! `services`). Callers read the file content; everything here operates on
//! bytes so it can be tested without touching the filesystem. Matching is
//! ASCII case-insensitive throughout, as the native resolvers behave.

use std::net::Ipv4Addr;

use crate::dirrec::{HostRecord, ProtoRecord, ServRecord};
use crate::sockdef::WS_AF_INET;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn strip_comment(line: &[u8]) -> &[u8] {
    match line.iter().position(|&b| b == b'#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn fields(line: &[u8]) -> impl Iterator<Item = &[u8]> {
    strip_comment(line)
        .split(|&b| b == b' ' || b == b'\t' || b == b'\r')
        .filter(|f| !f.is_empty())
}

/// Case-insensitive byte comparison for ASCII names.
fn eq_ignore_ascii_case(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| x.eq_ignore_ascii_case(y))
}

// ---------------------------------------------------------------------------
// hosts
// ---------------------------------------------------------------------------

/// Parses one hosts line: `<address> <hostname> [<alias>...]`.
///
/// Comment and blank lines yield `None`, as do lines whose address field is
/// not a literal IPv4 address (v6 entries are skipped; the record surface
/// serves the v4 directory).
pub fn parse_hosts_line(line: &[u8]) -> Option<(Ipv4Addr, Vec<Vec<u8>>)> {
    let mut it = fields(line);
    let addr_field = it.next()?;
    let names: Vec<Vec<u8>> = it.map(<[u8]>::to_vec).collect();
    if names.is_empty() {
        return None;
    }
    let addr = core::str::from_utf8(addr_field).ok()?.parse().ok()?;
    Some((addr, names))
}

/// Looks a hostname up in hosts content.
///
/// The first matching line supplies the canonical name (its first name
/// token); every other name token on matching lines becomes an alias, and
/// all matching lines contribute addresses.
#[must_use]
pub fn hosts_by_name(content: &[u8], name: &[u8]) -> Option<HostRecord> {
    let mut canonical: Option<Vec<u8>> = None;
    let mut aliases: Vec<Vec<u8>> = Vec::new();
    let mut addrs: Vec<Vec<u8>> = Vec::new();

    for line in content.split(|&b| b == b'\n') {
        let Some((addr, names)) = parse_hosts_line(line) else {
            continue;
        };
        if !names.iter().any(|n| eq_ignore_ascii_case(n, name)) {
            continue;
        }
        addrs.push(addr.octets().to_vec());
        for n in names {
            match &canonical {
                None => canonical = Some(n),
                Some(canon) => {
                    if !eq_ignore_ascii_case(&n, canon)
                        && !aliases.iter().any(|a| eq_ignore_ascii_case(a, &n))
                    {
                        aliases.push(n);
                    }
                }
            }
        }
    }

    Some(HostRecord {
        name: canonical?,
        aliases,
        addrtype: WS_AF_INET as i16,
        addr_len: 4,
        addrs,
    })
}

/// Reverse lookup: first line carrying the address wins.
#[must_use]
pub fn hosts_by_addr(content: &[u8], addr: Ipv4Addr) -> Option<HostRecord> {
    for line in content.split(|&b| b == b'\n') {
        let Some((line_addr, mut names)) = parse_hosts_line(line) else {
            continue;
        };
        if line_addr != addr {
            continue;
        }
        let name = names.remove(0);
        return Some(HostRecord {
            name,
            aliases: names,
            addrtype: WS_AF_INET as i16,
            addr_len: 4,
            addrs: vec![addr.octets().to_vec()],
        });
    }
    None
}

// ---------------------------------------------------------------------------
// protocols
// ---------------------------------------------------------------------------

/// Parses one protocols line: `<name> <number> [<alias>...]`.
pub fn parse_protocols_line(line: &[u8]) -> Option<(Vec<u8>, i16, Vec<Vec<u8>>)> {
    let mut it = fields(line);
    let name = it.next()?.to_vec();
    let number: i16 = core::str::from_utf8(it.next()?).ok()?.parse().ok()?;
    let aliases: Vec<Vec<u8>> = it.map(<[u8]>::to_vec).collect();
    Some((name, number, aliases))
}

#[must_use]
pub fn proto_by_name(content: &[u8], name: &[u8]) -> Option<ProtoRecord> {
    for line in content.split(|&b| b == b'\n') {
        let Some((line_name, number, aliases)) = parse_protocols_line(line) else {
            continue;
        };
        let hit = eq_ignore_ascii_case(&line_name, name)
            || aliases.iter().any(|a| eq_ignore_ascii_case(a, name));
        if hit {
            return Some(ProtoRecord {
                name: line_name,
                aliases,
                proto: number,
            });
        }
    }
    None
}

#[must_use]
pub fn proto_by_number(content: &[u8], number: i16) -> Option<ProtoRecord> {
    for line in content.split(|&b| b == b'\n') {
        let Some((name, line_number, aliases)) = parse_protocols_line(line) else {
            continue;
        };
        if line_number == number {
            return Some(ProtoRecord {
                name,
                aliases,
                proto: number,
            });
        }
    }
    None
}

// ---------------------------------------------------------------------------
// services
// ---------------------------------------------------------------------------

/// Parses one services line: `<name> <port>/<protocol> [<alias>...]`.
pub fn parse_services_line(line: &[u8]) -> Option<(Vec<u8>, u16, Vec<u8>, Vec<Vec<u8>>)> {
    let mut it = fields(line);
    let name = it.next()?.to_vec();
    let port_proto = it.next()?;

    let slash = port_proto.iter().position(|&b| b == b'/')?;
    let port: u16 = core::str::from_utf8(&port_proto[..slash]).ok()?.parse().ok()?;
    let proto = port_proto[slash + 1..].to_vec();
    if proto.is_empty() {
        return None;
    }
    let aliases: Vec<Vec<u8>> = it.map(<[u8]>::to_vec).collect();
    Some((name, port, proto, aliases))
}

/// Service lookup by name (or alias), optionally filtered by protocol. The
/// returned record carries the port in network byte order.
#[must_use]
pub fn serv_by_name(content: &[u8], name: &[u8], proto: Option<&[u8]>) -> Option<ServRecord> {
    for line in content.split(|&b| b == b'\n') {
        let Some((line_name, port, line_proto, aliases)) = parse_services_line(line) else {
            continue;
        };
        let name_hit = eq_ignore_ascii_case(&line_name, name)
            || aliases.iter().any(|a| eq_ignore_ascii_case(a, name));
        if !name_hit {
            continue;
        }
        if let Some(filter) = proto {
            if !eq_ignore_ascii_case(&line_proto, filter) {
                continue;
            }
        }
        return Some(ServRecord {
            name: line_name,
            aliases,
            port: port.to_be(),
            proto: line_proto,
        });
    }
    None
}

/// Service lookup by port in network byte order, optionally filtered by
/// protocol.
#[must_use]
pub fn serv_by_port(content: &[u8], port_net: u16, proto: Option<&[u8]>) -> Option<ServRecord> {
    let port = u16::from_be(port_net);
    for line in content.split(|&b| b == b'\n') {
        let Some((name, line_port, line_proto, aliases)) = parse_services_line(line) else {
            continue;
        };
        if line_port != port {
            continue;
        }
        if let Some(filter) = proto {
            if !eq_ignore_ascii_case(&line_proto, filter) {
                continue;
            }
        }
        return Some(ServRecord {
            name,
            aliases,
            port: port.to_be(),
            proto: line_proto,
        });
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const HOSTS: &[u8] = b"# local names\n\
127.0.0.1 localhost loopback\n\
10.0.0.7  fileserver files  # the NAS\n\
10.0.0.8  fileserver\n\
::1       localhost6\n";

    const PROTOCOLS: &[u8] = b"ip 0 IP\n\
icmp 1 ICMP\n\
tcp 6 TCP\n\
udp 17 UDP # user datagram\n";

    const SERVICES: &[u8] = b"ftp 21/tcp\n\
domain 53/tcp nameserver\n\
domain 53/udp nameserver\n\
http 80/tcp www www-http\n";

    // ---- hosts ----

    #[test]
    fn hosts_line_basic() {
        let (addr, names) = parse_hosts_line(b"127.0.0.1 localhost").unwrap();
        assert_eq!(addr, Ipv4Addr::LOCALHOST);
        assert_eq!(names, vec![b"localhost".to_vec()]);
    }

    #[test]
    fn hosts_line_rejects_comments_blanks_and_v6() {
        assert!(parse_hosts_line(b"# comment").is_none());
        assert!(parse_hosts_line(b"").is_none());
        assert!(parse_hosts_line(b"::1 localhost6").is_none());
        assert!(parse_hosts_line(b"10.0.0.1").is_none());
        assert!(parse_hosts_line(b"not-an-ip name").is_none());
    }

    #[test]
    fn hosts_by_name_merges_matching_lines() {
        let rec = hosts_by_name(HOSTS, b"fileserver").unwrap();
        assert_eq!(rec.name, b"fileserver");
        assert_eq!(rec.aliases, vec![b"files".to_vec()]);
        assert_eq!(rec.addrs, vec![vec![10, 0, 0, 7], vec![10, 0, 0, 8]]);
        assert_eq!(rec.addr_len, 4);
        assert_eq!(rec.addrtype, WS_AF_INET as i16);
    }

    #[test]
    fn hosts_by_name_matches_aliases_case_insensitively() {
        let rec = hosts_by_name(HOSTS, b"LOOPBACK").unwrap();
        assert_eq!(rec.name, b"localhost");
        assert_eq!(rec.addrs, vec![vec![127, 0, 0, 1]]);
    }

    #[test]
    fn hosts_by_name_miss() {
        assert!(hosts_by_name(HOSTS, b"nowhere").is_none());
    }

    #[test]
    fn hosts_by_addr_first_line_wins() {
        let rec = hosts_by_addr(HOSTS, Ipv4Addr::new(127, 0, 0, 1)).unwrap();
        assert_eq!(rec.name, b"localhost");
        assert_eq!(rec.aliases, vec![b"loopback".to_vec()]);
        assert!(hosts_by_addr(HOSTS, Ipv4Addr::new(10, 9, 9, 9)).is_none());
    }

    // ---- protocols ----

    #[test]
    fn protocols_line_basic() {
        let (name, number, aliases) = parse_protocols_line(b"tcp 6 TCP").unwrap();
        assert_eq!(name, b"tcp");
        assert_eq!(number, 6);
        assert_eq!(aliases, vec![b"TCP".to_vec()]);
    }

    #[test]
    fn proto_by_name_and_alias() {
        let rec = proto_by_name(PROTOCOLS, b"udp").unwrap();
        assert_eq!(rec.proto, 17);
        let rec = proto_by_name(PROTOCOLS, b"ICMP").unwrap();
        assert_eq!(rec.name, b"icmp");
        assert!(proto_by_name(PROTOCOLS, b"sctp").is_none());
    }

    #[test]
    fn proto_by_number_lookup() {
        let rec = proto_by_number(PROTOCOLS, 6).unwrap();
        assert_eq!(rec.name, b"tcp");
        assert!(proto_by_number(PROTOCOLS, 99).is_none());
    }

    // ---- services ----

    #[test]
    fn services_line_basic() {
        let (name, port, proto, aliases) = parse_services_line(b"http 80/tcp www").unwrap();
        assert_eq!(name, b"http");
        assert_eq!(port, 80);
        assert_eq!(proto, b"tcp");
        assert_eq!(aliases, vec![b"www".to_vec()]);
    }

    #[test]
    fn services_line_rejects_malformed() {
        assert!(parse_services_line(b"bad abc/tcp").is_none());
        assert!(parse_services_line(b"bad 80").is_none());
        assert!(parse_services_line(b"bad 80/").is_none());
        assert!(parse_services_line(b"# nothing").is_none());
    }

    #[test]
    fn serv_by_name_with_proto_filter() {
        let rec = serv_by_name(SERVICES, b"domain", Some(b"udp")).unwrap();
        assert_eq!(rec.port, 53u16.to_be());
        assert_eq!(rec.proto, b"udp");
        let rec = serv_by_name(SERVICES, b"domain", None).unwrap();
        assert_eq!(rec.proto, b"tcp");
        assert!(serv_by_name(SERVICES, b"ftp", Some(b"udp")).is_none());
    }

    #[test]
    fn serv_by_name_matches_alias() {
        let rec = serv_by_name(SERVICES, b"WWW", None).unwrap();
        assert_eq!(rec.name, b"http");
        assert_eq!(rec.aliases, vec![b"www".to_vec(), b"www-http".to_vec()]);
    }

    #[test]
    fn serv_by_port_network_order() {
        let rec = serv_by_port(SERVICES, 21u16.to_be(), Some(b"tcp")).unwrap();
        assert_eq!(rec.name, b"ftp");
        assert_eq!(rec.port, 21u16.to_be());
        assert!(serv_by_port(SERVICES, 9999u16.to_be(), None).is_none());
    }
}
