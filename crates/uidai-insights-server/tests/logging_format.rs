use std::io;
use std::sync::{Arc, Mutex};

use tempfile::tempdir;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use uidai_insights_ingest::NormalizationTables;
use uidai_insights_server::{InsightsConfig, InsightsService};

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

struct BufferWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedBuffer {
    type Writer = BufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BufferWriter(Arc::clone(&self.0))
    }
}

impl io::Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "lock poisoned"))?;
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn json_lines(sink: &SharedBuffer) -> Vec<serde_json::Value> {
    let bytes = sink.0.lock().expect("lock output").clone();
    let text = String::from_utf8(bytes).expect("utf8 log output");
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("json log line"))
        .collect()
}

#[tokio::test]
async fn aggregation_summary_is_structured_json() {
    let sink = SharedBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(sink.clone())
        .json()
        .with_max_level(Level::INFO)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let root = tempdir().expect("tempdir");
    let temp = tempdir().expect("tempdir");
    std::fs::write(
        root.path().join("enrolment_2024.csv"),
        "date,state,district,pincode,age_0_5,age_5_17,age_18_greater
01-08-2024,Kerala,Kollam,691001,1,0,0
02-08-2024,XYZ123,Nowhere,,5,5,5
",
    )
    .expect("write dataset");
    let cfg = InsightsConfig {
        local_roots: vec![root.path().to_path_buf()],
        remote_base_url: None,
        temp_root: temp.path().to_path_buf(),
        ..InsightsConfig::default()
    };
    let service =
        InsightsService::new(&cfg, NormalizationTables::builtin(), None).expect("service");
    service
        .aggregate_insights("enrolment", "2024")
        .await
        .expect("aggregated");

    let lines = json_lines(&sink);
    let summary = lines
        .iter()
        .find(|l| {
            l.get("fields")
                .and_then(|f| f.get("message"))
                .and_then(|m| m.as_str())
                == Some("aggregation complete")
        })
        .expect("aggregation summary event");
    assert_eq!(summary.get("level").and_then(|v| v.as_str()), Some("INFO"));
    let fields = summary.get("fields").expect("fields object");
    assert_eq!(
        fields.get("key").and_then(|v| v.as_str()),
        Some("agg_v7:enrolment:2024")
    );
    assert_eq!(fields.get("rows_read").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(fields.get("rows_kept").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(
        fields
            .get("rows_dropped_unresolved_state")
            .and_then(|v| v.as_u64()),
        Some(1)
    );
}
