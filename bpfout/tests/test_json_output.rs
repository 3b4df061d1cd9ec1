use bpfout::decode::RenderContext;
use bpfout::domain::{Epoch, HelperErrorInfo, MapDescriptor, MapValueKind, MessageKind, TimeSeries, TimeSeriesMap, TypeDescriptor};
use bpfout::output::escape::{escape, unescape};
use bpfout::output::{HistMap, JsonOutput, Output};
use bpfout_common::{log2_bucket, LOG2_BUCKETS};
use serde_json::{json, Value};
use std::collections::BTreeMap;

fn render_json(f: impl FnOnce(&mut dyn Output)) -> Vec<Value> {
    let mut out = Vec::new();
    let mut err = Vec::new();
    {
        let mut renderer = JsonOutput::new(&mut out, &mut err, RenderContext::new(1));
        f(&mut renderer);
    }
    String::from_utf8(out)
        .expect("Invalid UTF-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("Invalid JSON"))
        .collect()
}

#[test]
fn test_every_record_is_valid_json() {
    let string_map = MapDescriptor::new("@s", TypeDescriptor::string(8), MapValueKind::Count);
    let hist_map = MapDescriptor::new("@h", TypeDescriptor::None, MapValueKind::Hist { k: 0 });
    let mut buckets = vec![0u64; LOG2_BUCKETS];
    buckets[log2_bucket(100)] = 3;
    let ts_map = MapDescriptor::new(
        "@t",
        TypeDescriptor::uint(4),
        MapValueKind::TimeSeries { interval_ns: 1_000_000, num_intervals: 3 },
    );
    let series = TimeSeriesMap::from([(1u32.to_le_bytes().to_vec(), TimeSeries::from([(Epoch(2), 8)]))]);

    let records = render_json(|o| {
        o.attached_probes(1).unwrap();
        o.map(&string_map, 0, 1, &[(b"q\"\\\n\x01\0\0\0".to_vec(), 1u64.to_le_bytes().to_vec())])
            .unwrap();
        o.map_hist(&hist_map, 0, 1, &HistMap::from([(Vec::new(), buckets)]), &[(Vec::new(), 3)])
            .unwrap();
        o.map_tseries(&ts_map, 1, &series, &[(1u32.to_le_bytes().to_vec(), Epoch(2))]).unwrap();
        o.message(MessageKind::Printf, "\u{7f}\"quoted\"\n", false).unwrap();
        o.helper_error(-1, &HelperErrorInfo::new(2)).unwrap();
        o.benchmark_results(&BTreeMap::from([("x\"y".to_string(), 3)])).unwrap();
        o.lost_events(1).unwrap();
    });

    assert_eq!(records.len(), 8);
    assert_eq!(records[1]["data"]["@s"]["q\"\\\n\u{1}"], 1);
    assert_eq!(records[2]["data"]["@h"], json!([{"min": 64, "max": 127, "count": 3}]));
    assert_eq!(records[3]["data"]["@t"]["1"]["values"], json!([null, null, 8]));
    assert_eq!(records[4]["data"], "\u{7f}\"quoted\"\n");
    assert_eq!(records[5]["helper"], "map_update_elem");
    assert_eq!(records[6]["data"]["x\"y"], 3);
}

#[test]
fn test_struct_map_key_stays_a_json_string() {
    let key = TypeDescriptor::record(vec![("pid", TypeDescriptor::uint(4))]);
    let map = MapDescriptor::new("@k", key, MapValueKind::Count);
    let records = render_json(|o| {
        o.map(&map, 0, 1, &[(42u32.to_le_bytes().to_vec(), 1u64.to_le_bytes().to_vec())]).unwrap();
    });
    assert_eq!(records[0]["data"]["@k"][r#"{ "pid": 42 }"#], 1);
}

#[test]
fn test_pointer_and_buffer_values() {
    let records = render_json(|o| {
        o.value(&TypeDescriptor::Pointer, &0xdead_beefu64.to_le_bytes()).unwrap();
        o.value(&TypeDescriptor::Buffer { len: 3 }, &[0x00, 0xab, 0x10]).unwrap();
        o.value(&TypeDescriptor::array(TypeDescriptor::int(2), 2), &[0xff, 0xff, 2, 0]).unwrap();
    });
    assert_eq!(records[0]["data"], "0x00000000deadbeef");
    assert_eq!(records[1]["data"], "00ab10");
    assert_eq!(records[2]["data"], json!([-1, 2]));
}

#[test]
fn test_escape_round_trips_raw_bytes() {
    let samples: [&[u8]; 5] = [b"plain", b"tab\tnul\0end", &[0xff, 0xfe, b'a'], "ünïcödé".as_bytes(), &[0x80, b'"', 0x1f]];
    for raw in samples {
        let escaped = escape(raw);
        assert_eq!(unescape(&escaped).expect("Failed to unescape"), raw);
        let literal = format!("\"{escaped}\"");
        assert!(serde_json::from_str::<String>(&literal).is_ok(), "not a JSON string: {literal}");
    }
}
