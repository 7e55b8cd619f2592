use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::error::{Error, Result};

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

const TYPE_A: u16 = 1;
const TYPE_AAAA: u16 = 28;
const CLASS_IN: u16 = 1;

/// Resolve a hostname against a user-supplied DNS server.
///
/// Sends plain UDP queries for A and AAAA records and returns every address
/// found, IPv4 first. CNAME chains are followed within the answer section
/// only; resolvers include the terminal address records in the same
/// response.
pub async fn resolve(host: &str, server: SocketAddr) -> Result<Vec<IpAddr>> {
    let mut addrs = Vec::new();
    for qtype in [TYPE_A, TYPE_AAAA] {
        match query(host, server, qtype).await {
            Ok(found) => addrs.extend(found),
            Err(err) if qtype == TYPE_AAAA && !addrs.is_empty() => {
                // IPv4 answers are enough; log the v6 failure and move on.
                log::debug!("AAAA lookup for {host} failed: {err}");
            }
            Err(err) => return Err(err),
        }
    }
    if addrs.is_empty() {
        return Err(Error::Network(format!(
            "DNS server {server} returned no addresses for {host}"
        )));
    }
    Ok(addrs)
}

async fn query(host: &str, server: SocketAddr, qtype: u16) -> Result<Vec<IpAddr>> {
    let bind_addr: SocketAddr = if server.is_ipv4() {
        "0.0.0.0:0".parse().expect("valid bind address")
    } else {
        "[::]:0".parse().expect("valid bind address")
    };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| Error::Network(format!("binding DNS socket: {e}")))?;
    socket
        .connect(server)
        .await
        .map_err(|e| Error::Network(format!("connecting to DNS server {server}: {e}")))?;

    let id = (std::process::id() as u16) ^ (qtype.rotate_left(8));
    let packet = encode_query(id, host, qtype)?;
    socket
        .send(&packet)
        .await
        .map_err(|e| Error::Network(format!("sending DNS query to {server}: {e}")))?;

    let mut buf = [0u8; 1500];
    let len = tokio::time::timeout(QUERY_TIMEOUT, socket.recv(&mut buf))
        .await
        .map_err(|_| Error::Network(format!("DNS server {server} did not respond")))?
        .map_err(|e| Error::Network(format!("receiving DNS response: {e}")))?;

    parse_answers(&buf[..len], id)
}

/// Encode a single-question query with recursion desired.
fn encode_query(id: u16, host: &str, qtype: u16) -> Result<Vec<u8>> {
    let mut packet = Vec::with_capacity(32 + host.len());
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&0x0100u16.to_be_bytes()); // RD
    packet.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    packet.extend_from_slice(&[0; 6]); // AN/NS/AR counts

    for label in host.trim_end_matches('.').split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(Error::Network(format!("invalid hostname '{host}'")));
        }
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0);
    packet.extend_from_slice(&qtype.to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(packet)
}

fn parse_answers(packet: &[u8], expect_id: u16) -> Result<Vec<IpAddr>> {
    if packet.len() < 12 {
        return Err(Error::Network("short DNS response".into()));
    }
    let id = u16::from_be_bytes([packet[0], packet[1]]);
    if id != expect_id {
        return Err(Error::Network("DNS response id mismatch".into()));
    }
    let rcode = packet[3] & 0x0f;
    if rcode != 0 {
        return Err(Error::Network(format!(
            "DNS query failed with rcode {rcode}"
        )));
    }
    let qdcount = u16::from_be_bytes([packet[4], packet[5]]);
    let ancount = u16::from_be_bytes([packet[6], packet[7]]);

    let mut pos = 12;
    for _ in 0..qdcount {
        pos = skip_name(packet, pos)?;
        pos += 4; // qtype + qclass
    }

    let mut addrs = Vec::new();
    for _ in 0..ancount {
        pos = skip_name(packet, pos)?;
        if pos + 10 > packet.len() {
            return Err(Error::Network("truncated DNS answer".into()));
        }
        let rtype = u16::from_be_bytes([packet[pos], packet[pos + 1]]);
        let rdlen = u16::from_be_bytes([packet[pos + 8], packet[pos + 9]]) as usize;
        pos += 10;
        if pos + rdlen > packet.len() {
            return Err(Error::Network("truncated DNS answer".into()));
        }
        let rdata = &packet[pos..pos + rdlen];
        match rtype {
            TYPE_A if rdlen == 4 => {
                addrs.push(IpAddr::V4(Ipv4Addr::new(
                    rdata[0], rdata[1], rdata[2], rdata[3],
                )));
            }
            TYPE_AAAA if rdlen == 16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(rdata);
                addrs.push(IpAddr::V6(Ipv6Addr::from(octets)));
            }
            // CNAME and anything else: skip; the address records that
            // terminate the chain appear as their own answers.
            _ => {}
        }
        pos += rdlen;
    }
    Ok(addrs)
}

/// Skip over a (possibly compressed) domain name, returning the position
/// just past it.
fn skip_name(packet: &[u8], mut pos: usize) -> Result<usize> {
    loop {
        let len = *packet
            .get(pos)
            .ok_or_else(|| Error::Network("truncated DNS name".into()))?;
        if len & 0xc0 == 0xc0 {
            // Compression pointer: two bytes, then the name ends.
            return Ok(pos + 2);
        }
        if len == 0 {
            return Ok(pos + 1);
        }
        pos += 1 + len as usize;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_encoding() {
        let packet = encode_query(0x1234, "example.com", TYPE_A).unwrap();
        assert_eq!(&packet[..2], &[0x12, 0x34]);
        assert_eq!(&packet[2..4], &[0x01, 0x00]);
        // 7"example" 3"com" 0
        let name_start = 12;
        assert_eq!(packet[name_start], 7);
        assert_eq!(&packet[name_start + 1..name_start + 8], b"example");
        assert_eq!(packet[name_start + 8], 3);
        assert_eq!(packet[packet.len() - 5], 0);
        assert_eq!(&packet[packet.len() - 4..], &[0, 1, 0, 1]);
    }

    #[test]
    fn rejects_bad_hostnames() {
        assert!(encode_query(1, "bad..name", TYPE_A).is_err());
    }

    #[test]
    fn parses_a_record_answer() {
        // Header: id 1, response flags, 1 question, 1 answer.
        let mut packet = vec![
            0x00, 0x01, 0x81, 0x80, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        ];
        // Question: example.com A IN
        packet.extend_from_slice(b"\x07example\x03com\x00\x00\x01\x00\x01");
        // Answer: pointer to offset 12, A IN, ttl 60, rdlen 4, 93.184.216.34
        packet.extend_from_slice(&[0xc0, 0x0c, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x3c]);
        packet.extend_from_slice(&[0x00, 0x04, 93, 184, 216, 34]);

        let addrs = parse_answers(&packet, 1).unwrap();
        assert_eq!(addrs, vec![IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))]);
    }

    #[test]
    fn nonzero_rcode_is_an_error() {
        let packet = [
            0x00, 0x01, 0x81, 0x83, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let err = parse_answers(&packet, 1).unwrap_err();
        assert!(err.to_string().contains("rcode 3"));
    }

    #[test]
    fn id_mismatch_rejected() {
        let packet = [
            0x00, 0x02, 0x81, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert!(parse_answers(&packet, 1).is_err());
    }

    #[test]
    fn skips_cname_records() {
        let mut packet = vec![
            0x00, 0x01, 0x81, 0x80, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00,
        ];
        // CNAME answer: root name, CNAME(5) IN, ttl, rdlen 2, bogus rdata
        packet.extend_from_slice(&[0x00, 0x00, 0x05, 0x00, 0x01, 0, 0, 0, 60, 0x00, 0x02, 1, 2]);
        // A answer: root name, A IN, ttl, rdlen 4
        packet.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x01, 0, 0, 0, 60, 0x00, 0x04, 10, 0, 0, 1]);

        let addrs = parse_answers(&packet, 1).unwrap();
        assert_eq!(addrs, vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))]);
    }
}
