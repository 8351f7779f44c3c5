//! Field extraction from schema-less records.
//!
//! Every purpose owns an ordered list of candidate keys; the first key whose
//! value is non-empty wins. Absence is not an error, callers skip the record.

use crate::AnalysisRecord;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldPurpose {
    Path,
    ProcessId,
    ParentId,
    LocalAddress,
    ForeignAddress,
    LocalPort,
    ForeignPort,
    Protocol,
    State,
    Size,
    Offset,
    EntryType,
    Attributes,
    DisplayName,
}

impl FieldPurpose {
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            FieldPurpose::Path => &["Path", "ImageFileName", "FilePath", "Name", "FileName"],
            FieldPurpose::ProcessId => &["PID", "Pid", "pid", "ProcessId"],
            FieldPurpose::ParentId => &["PPID", "PPid", "ppid", "ParentPid", "InheritedFromUniqueProcessId"],
            FieldPurpose::LocalAddress => &["LocalAddr", "LocalAddress", "Local Address", "SrcAddr"],
            FieldPurpose::ForeignAddress => &["ForeignAddr", "ForeignAddress", "Foreign Address", "RemoteAddr", "DstAddr"],
            FieldPurpose::LocalPort => &["LocalPort", "Local Port", "SrcPort"],
            FieldPurpose::ForeignPort => &["ForeignPort", "Foreign Port", "RemotePort", "DstPort"],
            FieldPurpose::Protocol => &["Proto", "Protocol", "proto"],
            FieldPurpose::State => &["State", "state", "Status"],
            FieldPurpose::Size => &["Size", "FileSize", "size"],
            FieldPurpose::Offset => &["Offset", "Offset(V)", "Offset(P)", "VirtAddr", "Address"],
            FieldPurpose::EntryType => &["FileType", "Type", "type"],
            FieldPurpose::Attributes => &["Attributes", "Attribute", "FileAttributes", "Flags"],
            FieldPurpose::DisplayName => &["ImageFileName", "Name", "Process", "COMM", "name"],
        }
    }
}

/// First non-empty textual value for `purpose`. Numbers are rendered in decimal.
pub fn resolve(record: &AnalysisRecord, purpose: FieldPurpose) -> Option<String> {
    purpose
        .candidates()
        .iter()
        .filter_map(|k| record.get(*k))
        .find_map(text_of)
}

/// First candidate value that parses as an integer (number, decimal or `0x` hex string).
pub fn resolve_int(record: &AnalysisRecord, purpose: FieldPurpose) -> Option<i64> {
    purpose
        .candidates()
        .iter()
        .filter_map(|k| record.get(*k))
        .find_map(int_of)
}

pub fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() { None } else { Some(t.to_string()) }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn int_of(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok())),
        Value::String(s) => parse_int(s),
        _ => None,
    }
}

pub fn parse_int(s: &str) -> Option<i64> {
    let t = s.trim();
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().and_then(|u| i64::try_from(u).ok());
    }
    t.parse().ok()
}
