//! Plain-text rendering for terminal output.

use case_session::SessionEvent;
use net_topology::NetworkGraph;
use scan_api::CaseSummary;
use scanview_core::TreeNode;
use std::fmt::Write;

pub fn forest(roots: &[TreeNode]) -> String {
    let mut out = String::new();
    for r in roots {
        node(&mut out, r, 0);
    }
    out
}

fn node(out: &mut String, n: &TreeNode, depth: usize) {
    let slash = if n.is_container { "/" } else { "" };
    let _ = writeln!(out, "{:indent$}{}{}", "", n.name, slash, indent = depth * 2);
    for c in n.children() {
        node(out, c, depth + 1);
    }
}

pub fn graph(g: &NetworkGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "endpoints ({}):", g.nodes.len());
    for n in &g.nodes {
        let _ = writeln!(out, "  {:<40} {:<8} degree {}", n.id, format!("{:?}", n.class).to_lowercase(), n.degree);
    }
    let _ = writeln!(out, "connections ({}):", g.edges.len());
    for e in &g.edges {
        let lport = e.local_port().map(|p| format!(":{}", p)).unwrap_or_default();
        let fport = e.foreign_port().map(|p| format!(":{}", p)).unwrap_or_default();
        let _ = writeln!(
            out,
            "  {}{} -> {}{} {} {}",
            e.source,
            lport,
            e.target,
            fport,
            e.protocol().unwrap_or_default(),
            e.state().unwrap_or_default()
        );
    }
    out
}

pub fn case_line(c: &CaseSummary) -> String {
    format!("{}  {:<9} {}", c.uuid, format!("{:?}", c.status).to_lowercase(), c.display_name())
}

pub fn event(ev: &SessionEvent) -> String {
    match ev {
        SessionEvent::StatesChanged { case, states } => {
            let parts: Vec<String> = states.values().map(|s| format!("{}={:?}", s.name, s.status)).collect();
            format!("[{}] modules: {}", case, parts.join(" "))
        }
        SessionEvent::Transition(t) => match &t.error_detail {
            Some(err) => format!("[{}] {} {:?} -> {:?} ({})", t.case, t.module, t.from, t.to, err),
            None => format!("[{}] {} {:?} -> {:?}", t.case, t.module, t.from, t.to),
        },
        SessionEvent::AutoSelected { case, module } => format!("[{}] selected {}", case, module),
        SessionEvent::ModuleReady(ev) => format!("[{}] new module ready: {}", ev.case, ev.module),
        SessionEvent::ResultsRefreshed { case, module, records } => {
            format!("[{}] {} results refreshed ({} records)", case, module, records.len())
        }
    }
}
