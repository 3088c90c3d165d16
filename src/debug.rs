use crate::{RecordId, RecordSet};
#[cfg(feature = "debug")]
use serde_json::json;

#[cfg(feature = "debug")]
thread_local!(
    static DEBUG_FRAME: std::cell::RefCell<Vec<serde_json::Value>> = Default::default();
);

/// Records a snapshot of a perception window after an operation on it.
#[allow(unused)]
pub fn debug_window(event: &str, records: &RecordSet, root: RecordId, pruned: usize) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        let lanes = records
            .values()
            .map(|record| {
                json!({
                    "segment": format!("{:?}", record.segment()),
                    "direction": format!("{:?}", record.direction()),
                    "start": record.start_distance(),
                    "end": record.end_distance(),
                    "cut_off_start": record.cut_off_start(),
                    "cut_off_end": record.cut_off_end(),
                    "dead_end": record.is_dead_end(),
                })
            })
            .collect::<Vec<_>>();
        frame.borrow_mut().push(json!({
            "type": "window",
            "event": event,
            "root": format!("{:?}", root),
            "pruned": pruned,
            "lanes": lanes,
        }))
    })
}

/// Records the outcome of a route compliance search.
#[allow(unused)]
pub fn debug_compliance(lane: &str, at_end: bool, result: bool, visited: usize) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        frame.borrow_mut().push(json!({
            "type": "compliance",
            "lane": lane,
            "at_end": at_end,
            "result": result,
            "visited": visited,
        }))
    })
}

/// Takes the events recorded on this thread since the last call.
#[cfg(feature = "debug")]
pub fn take_debug_frame() -> serde_json::Value {
    json!(DEBUG_FRAME.with(|frame| frame.take()))
}
