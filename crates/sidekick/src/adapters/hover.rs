//
// adapters/hover.rs
//
// Hover adapter: quick info at a cursor offset with document bounds
//

use serde::Serialize;

use crate::coords::{engine_span_to_host, host_position_to_engine};
use crate::env::Environment;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoverBlock {
    pub kind: String,
    pub display: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub documentation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoverInfo {
    pub start: usize,
    pub end: usize,
    pub info: HoverBlock,
}

/// Hover information at a host offset, `None` when the engine has nothing
pub fn hover(env: &Environment, offset: usize) -> Option<HoverInfo> {
    let len = env.files().document_len();
    if offset > len {
        return None;
    }

    let quick_info = env
        .session()
        .quick_info_at(env.document_path(), host_position_to_engine(offset))?;
    let (start, end) = engine_span_to_host(quick_info.text_span.start, quick_info.text_span.length);

    Some(HoverInfo {
        start: start.min(len),
        end: end.min(len),
        info: HoverBlock {
            kind: quick_info.kind,
            display: quick_info.display,
            documentation: quick_info.documentation,
        },
    })
}
