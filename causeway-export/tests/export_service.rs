//! Export of a registered service's synthesized descriptor set.

use causeway::{Record, RpcError, Service};
use causeway_export::{export_set, write_zip, ExportOptions};
use causeway_schema::{SchemaBuilder, SchemaConfig};

#[derive(Record, Clone)]
struct ScheduleRequest {
    /// When the job should first run.
    starts_at: std::time::SystemTime,
    /// Gap between runs.
    interval: std::time::Duration,
}

#[derive(Record, Clone, Default)]
struct ScheduleResponse {
    accepted: bool,
}

fn exported() -> Vec<causeway_export::ProtoFile> {
    let service = Service::builder("jobs.v1", "Scheduler")
        .unary("Schedule", |_ctx, _req: ScheduleRequest| async move {
            Ok::<_, RpcError>(ScheduleResponse { accepted: true })
        })
        .build()
        .unwrap();
    let set = SchemaBuilder::new(SchemaConfig::for_service(&service))
        .build_service_set(&service)
        .unwrap();
    export_set(&set, &ExportOptions::default()).unwrap()
}

#[test]
fn well_known_imports_appear_in_the_source() {
    let files = exported();
    let request = files
        .iter()
        .find(|f| f.name == "jobs.v1/schedulerequest.proto")
        .expect("request file");
    assert!(request
        .content
        .contains("import \"google/protobuf/timestamp.proto\";"));
    assert!(request
        .content
        .contains("import \"google/protobuf/duration.proto\";"));
    assert!(request
        .content
        .contains("google.protobuf.Timestamp starts_at = 1;"));
    assert!(request
        .content
        .contains("google.protobuf.Duration interval = 2;"));
}

#[test]
fn service_block_lists_exactly_one_rpc() {
    let files = exported();
    let service = files
        .iter()
        .find(|f| f.name == "jobs.v1/scheduler.proto")
        .expect("service file");
    assert_eq!(service.content.matches("rpc ").count(), 1);
    assert!(service
        .content
        .contains("rpc Schedule(ScheduleRequest) returns (ScheduleResponse);"));
}

#[test]
fn doc_comments_do_not_break_export_and_zip_is_stable() {
    let files = exported();
    assert_eq!(write_zip(&files).unwrap(), write_zip(&files).unwrap());
}
