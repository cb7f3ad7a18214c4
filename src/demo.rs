//! Simulated host for `--demo`: two fake devices and a scan that reports
//! progress and found files on a timer.

use dashmap::DashMap;
use log::{debug, info};
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use std::time::Duration;

use recovery_bridge::channels;
use recovery_bridge::transport::LoopbackTransport;

const TICKS: u64 = 10;
const TICK: Duration = Duration::from_millis(150);
const SAMPLE_FILES: [(&str, &str, u64); 4] = [
    ("IMG_0412.jpg", "photos", 2_411_776),
    ("holiday.mp4", "videos", 48_234_496),
    ("thesis-final.docx", "documents", 731_136),
    ("voice-memo.m4a", "audio", 1_204_224),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Run {
    Running,
    Paused,
}

pub fn install(host: &Arc<LoopbackTransport>) {
    let sessions: Arc<DashMap<String, Run>> = Arc::new(DashMap::new());

    host.reply(channels::DEVICE_LIST, devices());
    host.reply(channels::DEVICE_REFRESH, devices());
    host.reply(
        channels::PRIVILEGE_CHECK,
        json!({"success": true, "status": {"elevated": false, "platform": std::env::consts::OS}}),
    );
    host.reply(
        channels::PRIVILEGE_REQUEST,
        json!({"success": true, "status": {"elevated": true, "platform": std::env::consts::OS, "helperPid": std::process::id()}}),
    );

    let weak = Arc::downgrade(host);
    let table = sessions.clone();
    host.on(channels::SCAN_START, move |config| {
        let session_id = uuid::Uuid::new_v4().to_string();
        let total = config.get("totalSize").and_then(parse_size).unwrap_or(0);
        table.insert(session_id.clone(), Run::Running);
        info!("demo scan {} started", session_id);
        tokio::spawn(run_scan(weak.clone(), table.clone(), session_id.clone(), total));
        Ok(json!({"success": true, "sessionId": session_id}))
    });

    for (channel, next) in [
        (channels::SCAN_PAUSE, Some(Run::Paused)),
        (channels::SCAN_RESUME, Some(Run::Running)),
        (channels::SCAN_CANCEL, None),
    ] {
        let table = sessions.clone();
        host.on(channel, move |payload| {
            let id = payload.get("sessionId").and_then(Value::as_str).unwrap_or_default();
            if !table.contains_key(id) {
                return Ok(json!({"success": false, "error": format!("No scan session {}", id)}));
            }
            match next {
                Some(run) => {
                    table.insert(id.to_string(), run);
                }
                None => {
                    table.remove(id);
                }
            }
            Ok(json!({"success": true}))
        });
    }
}

fn devices() -> Value {
    json!({
        "success": true,
        "devices": [
            {
                "path": "/dev/sdb",
                "size": "31914983424",
                "name": "SanDisk Ultra",
                "removable": true,
                "partitions": [
                    {"path": "/dev/sdb1", "size": "31913934848", "offset": "1048576", "label": "CAMERA"}
                ]
            },
            {
                "path": "/dev/nvme0n1",
                "size": "512110190592",
                "model": "Samsung 980",
                "removable": false
            }
        ]
    })
}

fn parse_size(value: &Value) -> Option<u64> {
    match value {
        Value::String(text) => text.parse().ok(),
        other => other.as_u64(),
    }
}

async fn run_scan(host: Weak<LoopbackTransport>, sessions: Arc<DashMap<String, Run>>, session_id: String, total: u64) {
    let mut tick = 0;
    let mut found = 0;
    while tick < TICKS {
        tokio::time::sleep(TICK).await;
        let Some(run) = sessions.get(&session_id).map(|r| *r) else {
            debug!("demo scan {} cancelled", session_id);
            return;
        };
        if run == Run::Paused {
            continue;
        }
        let Some(host) = host.upgrade() else {
            return;
        };
        tick += 1;

        if tick % 3 == 0 && (found as usize) < SAMPLE_FILES.len() {
            let (name, category, size) = SAMPLE_FILES[found as usize];
            host.emit_one(
                channels::SCAN_FILE_FOUND,
                json!({
                    "id": format!("f{}", found + 1),
                    "name": name,
                    "size": size.to_string(),
                    "offset": (total / TICKS * tick).to_string(),
                    "category": category,
                    "confidence": "high",
                }),
            );
            found += 1;
        }

        host.emit_one(
            channels::SCAN_PROGRESS,
            json!({
                "sessionId": session_id,
                "bytesScanned": (total / TICKS * tick).to_string(),
                "totalBytes": total.to_string(),
                "filesFound": found,
                "percent": (tick * 100 / TICKS) as f64,
            }),
        );
    }

    sessions.remove(&session_id);
    if let Some(host) = host.upgrade() {
        host.emit_one(channels::SCAN_COMPLETE, json!({"sessionId": session_id, "filesFound": found}));
    }
}
