//! Network topology (endpoint nodes + connection edges) from connection records.

use ipnet::IpNet;
use scanview_core::normalize::{self, FieldPurpose};
use scanview_core::AnalysisRecord;
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::OnceLock;

pub const BASE_WEIGHT: f64 = 1.0;
/// Weight added to each endpoint per incident edge.
pub const WEIGHT_STEP: f64 = 0.2;

const PRIVATE_RANGES: &[&str] = &["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16", "fc00::/7", "fe80::/10"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointClass {
    Loopback,
    Private,
    Public,
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub weight: f64,
    pub degree: usize,
    pub class: EndpointClass,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub metadata: AnalysisRecord,
}

impl GraphEdge {
    pub fn protocol(&self) -> Option<String> { normalize::resolve(&self.metadata, FieldPurpose::Protocol) }
    pub fn state(&self) -> Option<String> { normalize::resolve(&self.metadata, FieldPurpose::State) }
    pub fn local_port(&self) -> Option<i64> { normalize::resolve_int(&self.metadata, FieldPurpose::LocalPort) }
    pub fn foreign_port(&self) -> Option<i64> { normalize::resolve_int(&self.metadata, FieldPurpose::ForeignPort) }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl NetworkGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

fn private_nets() -> &'static [IpNet] {
    static NETS: OnceLock<Vec<IpNet>> = OnceLock::new();
    NETS.get_or_init(|| PRIVATE_RANGES.iter().filter_map(|s| s.parse().ok()).collect())
}

/// Strip `[..]` brackets and `%zone` suffixes before parsing.
fn parse_ip(addr: &str) -> Option<IpAddr> {
    let a = addr.trim_start_matches('[').trim_end_matches(']');
    let a = a.split('%').next().unwrap_or(a);
    a.parse().ok()
}

/// Classify an endpoint: wildcard forms first, then loopback, then private
/// ranges, everything else public.
pub fn classify(addr: &str) -> EndpointClass {
    let addr = addr.trim();
    if matches!(addr, "0.0.0.0" | "::" | "*") {
        return EndpointClass::Wildcard;
    }
    match parse_ip(addr) {
        Some(ip) => classify_ip(ip),
        None => classify_text(addr),
    }
}

fn classify_ip(ip: IpAddr) -> EndpointClass {
    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    };
    if ip.is_unspecified() {
        EndpointClass::Wildcard
    } else if ip.is_loopback() {
        EndpointClass::Loopback
    } else if private_nets().iter().any(|n| n.contains(&ip)) {
        EndpointClass::Private
    } else {
        EndpointClass::Public
    }
}

// Not an IP literal (hostnames, truncated output): prefix heuristics.
fn classify_text(addr: &str) -> EndpointClass {
    let lower = addr.to_ascii_lowercase();
    if lower.starts_with("127.") || lower == "localhost" {
        EndpointClass::Loopback
    } else if lower.starts_with("10.") || lower.starts_with("192.168.") || lower.starts_with("172.16.") {
        EndpointClass::Private
    } else {
        EndpointClass::Public
    }
}

pub fn build_network_graph(records: &[AnalysisRecord]) -> NetworkGraph {
    let mut graph = NetworkGraph::default();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
        let (Some(local), Some(foreign)) = (
            normalize::resolve(record, FieldPurpose::LocalAddress),
            normalize::resolve(record, FieldPurpose::ForeignAddress),
        ) else {
            continue;
        };
        for addr in [&local, &foreign] {
            let i = *index.entry(addr.clone()).or_insert_with(|| {
                graph.nodes.push(GraphNode { id: addr.clone(), weight: BASE_WEIGHT, degree: 0, class: classify(addr) });
                graph.nodes.len() - 1
            });
            graph.nodes[i].weight += WEIGHT_STEP;
            graph.nodes[i].degree += 1;
        }
        graph.edges.push(GraphEdge { source: local, target: foreign, metadata: record.clone() });
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn conn(local: &str, foreign: &str, proto: &str, lport: u16) -> AnalysisRecord {
        json!({"LocalAddr": local, "ForeignAddr": foreign, "Proto": proto, "LocalPort": lport, "ForeignPort": 443, "State": "ESTABLISHED"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn classification_examples() {
        assert_eq!(classify("127.0.0.1"), EndpointClass::Loopback);
        assert_eq!(classify("192.168.1.5"), EndpointClass::Private);
        assert_eq!(classify("8.8.8.8"), EndpointClass::Public);
        assert_eq!(classify("0.0.0.0"), EndpointClass::Wildcard);
        assert_eq!(classify("*"), EndpointClass::Wildcard);
        assert_eq!(classify("::"), EndpointClass::Wildcard);
    }

    #[test]
    fn classification_covers_v6_and_ranges() {
        assert_eq!(classify("::1"), EndpointClass::Loopback);
        assert_eq!(classify("[::1]"), EndpointClass::Loopback);
        assert_eq!(classify("::ffff:127.0.0.1"), EndpointClass::Loopback);
        assert_eq!(classify("fe80::1%eth0"), EndpointClass::Private);
        assert_eq!(classify("172.20.0.4"), EndpointClass::Private);
        assert_eq!(classify("172.32.0.4"), EndpointClass::Public);
        assert_eq!(classify("10.1.2.3"), EndpointClass::Private);
        assert_eq!(classify("2001:4860:4860::8888"), EndpointClass::Public);
        assert_eq!(classify("localhost"), EndpointClass::Loopback);
    }

    #[test]
    fn multi_edges_are_preserved() {
        let records = vec![
            conn("10.0.0.1", "10.0.0.2", "TCPv4", 5000),
            conn("10.0.0.1", "10.0.0.2", "UDPv4", 5001),
        ];
        let g = build_network_graph(&records);
        assert_eq!(g.nodes.len(), 2);
        assert_eq!(g.edges.len(), 2);
        assert_eq!(g.edges[1].protocol().as_deref(), Some("UDPv4"));
        assert_eq!(g.edges[1].local_port(), Some(5001));
        let n = g.node("10.0.0.1").unwrap();
        assert_eq!(n.degree, 2);
        assert!((n.weight - (BASE_WEIGHT + 2.0 * WEIGHT_STEP)).abs() < 1e-9);
    }

    #[test]
    fn node_count_is_distinct_endpoints() {
        let records = vec![
            conn("192.168.1.5", "8.8.8.8", "TCPv4", 1),
            conn("192.168.1.5", "1.1.1.1", "TCPv4", 2),
            conn("0.0.0.0", "*", "UDPv4", 3),
            conn("127.0.0.1", "127.0.0.1", "TCPv4", 4),
        ];
        let g = build_network_graph(&records);
        let ids: Vec<_> = g.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["192.168.1.5", "8.8.8.8", "1.1.1.1", "0.0.0.0", "*", "127.0.0.1"]);
        assert_eq!(g.edges.len(), 4);
        assert_eq!(g.node("*").unwrap().class, EndpointClass::Wildcard);
        assert_eq!(g.node("127.0.0.1").unwrap().degree, 2);
    }

    #[test]
    fn records_missing_an_endpoint_are_skipped() {
        let mut r = conn("10.0.0.1", "", "TCPv4", 1);
        let records = vec![r.clone(), {
            r.remove("ForeignAddr");
            r.insert("LocalAddr".into(), Value::Null);
            r
        }];
        let g = build_network_graph(&records);
        assert!(g.nodes.is_empty());
        assert!(g.edges.is_empty());
    }

    #[test]
    fn edge_keeps_full_record() {
        let g = build_network_graph(&[conn("10.0.0.1", "8.8.4.4", "TCPv4", 7)]);
        assert_eq!(g.edges[0].source, "10.0.0.1");
        assert_eq!(g.edges[0].target, "8.8.4.4");
        assert_eq!(g.edges[0].state().as_deref(), Some("ESTABLISHED"));
        assert_eq!(g.edges[0].foreign_port(), Some(443));
    }
}
