use airgap_fs::client::output::{render, run_list, CsvFile, ListConfig, FILE_NAME};
use airgap_fs::client::{ApiClient, ClientConfig, ClientError, ListStream};
use airgap_fs::config::{AppConfig, StoreMode};
use airgap_fs::models::file::{FileId, UploadInfo};
use airgap_fs::routes::build_router;
use airgap_fs::state::AppState;
use airgap_fs::storage::FileStore;
use bytes::Bytes;
use futures_util::stream;
use std::collections::BTreeMap;

async fn start_server(data_dir: &str) -> String {
    let config = AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        data_dir: data_dir.to_string(),
        db_name: "client".to_string(),
        store_mode: StoreMode::SingleNode,
        node_address: "127.0.0.1:0".to_string(),
        cluster_peers: Vec::new(),
        handover_timeout_secs: 1,
        max_db_connections: 4,
        tombstone_grace_secs: 43_200,
        tombstone_sweep_interval_secs: 3600,
        download_chunk_size: 1024,
        log_level: "error".to_string(),
    };
    let store = FileStore::open(&config).await.unwrap();
    let app = build_router(AppState::new(config, store));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(server_url: String) -> ApiClient {
    ApiClient::new(&ClientConfig {
        server_url,
        chunk_size: 4,
    })
    .unwrap()
}

fn info(id: &str, name: &str) -> UploadInfo {
    UploadInfo {
        file_id: FileId {
            id: id.to_string(),
            name: name.to_string(),
        },
        size: 10,
        compression: false,
        compression_type: String::new(),
        created_at: Some(1_618_272_000),
        metadata: BTreeMap::from([("type".to_string(), "report, q1".to_string())]),
    }
}

fn chunks(
    parts: &[&'static str],
) -> impl futures_util::Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static {
    let parts: Vec<std::io::Result<Bytes>> = parts
        .iter()
        .map(|p| Ok(Bytes::from_static(p.as_bytes())))
        .collect();
    stream::iter(parts)
}

#[tokio::test]
async fn test_upload_and_list_to_csv() {
    let data = tempfile::tempdir().unwrap();
    let api = client(start_server(data.path().to_str().unwrap()).await);

    let uploaded = api
        .upload_stream(info("123hft", "dummy"), chunks(&["01234", "56789"]))
        .await
        .unwrap();
    assert_eq!(uploaded.size, 10);
    api.upload_stream(info("other", "other"), chunks(&["x"]))
        .await
        .unwrap();

    let out = tempfile::tempdir().unwrap();
    let rows = run_list(
        &api,
        &ListConfig {
            filters: vec!["provided_name EQUAL 'dummy'".into()],
            sorts: vec!["created_at ASC".into()],
            output_dir: Some(out.path().to_path_buf()),
        },
    )
    .await
    .unwrap();
    assert_eq!(rows, 1);

    let csv = std::fs::read_to_string(out.path().join(FILE_NAME)).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "File ID,File Name,Size,Created At,Compression,Compression Type,Metadata"
    );
    assert_eq!(
        lines[1],
        r#"123hft,dummy,10,2021-04-13T00:00:00+00:00,false,,"{""type"":""report, q1""}""#
    );
    assert_eq!(lines.len(), 2);
}

#[tokio::test]
async fn test_upload_file_from_disk() {
    let data = tempfile::tempdir().unwrap();
    let api = client(start_server(data.path().to_str().unwrap()).await);

    let src = tempfile::tempdir().unwrap();
    let path = src.path().join("notes.txt");
    std::fs::write(&path, b"hello airgap").unwrap();

    let mut envelope = info("disk", "notes.txt");
    envelope.created_at = None;
    let uploaded = api.upload_file(&path, envelope).await.unwrap();
    assert_eq!(uploaded.size, 12);

    let fetched = api.get_file("disk").await.unwrap();
    assert_eq!(fetched.size, 12);
    assert!(fetched.created_at > 0);
}

#[tokio::test]
async fn test_duplicate_upload_reports_status() {
    let data = tempfile::tempdir().unwrap();
    let api = client(start_server(data.path().to_str().unwrap()).await);

    api.upload_stream(info("dup", "a"), chunks(&["a"])).await.unwrap();
    let err = api
        .upload_stream(info("dup", "b"), chunks(&["b"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Status { code: 409, .. }));
}

#[tokio::test]
async fn test_rejected_query_leaves_no_file() {
    let data = tempfile::tempdir().unwrap();
    let api = client(start_server(data.path().to_str().unwrap()).await);
    let out = tempfile::tempdir().unwrap();

    // Parse error: nothing is sent.
    let err = run_list(
        &api,
        &ListConfig {
            filters: vec!["description LESS_THAN 3".into()],
            output_dir: Some(out.path().to_path_buf()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ClientError::Query(_)));
    assert!(!out.path().join(FILE_NAME).exists());
}

#[tokio::test]
async fn test_failure_mid_stream_removes_csv() {
    let record = r#"{"results":{"file_id":{"id":"a","name":"b"},"size":1,"compression":false,"compression_type":"","created_at":0,"deleted_at":null,"metadata":{}}}"#;
    let body = stream::iter(vec![
        Ok(Bytes::from(format!("{record}\n"))),
        Err("connection reset by peer"),
    ]);
    let mut list = ListStream::new(body);

    let out = tempfile::tempdir().unwrap();
    let mut csv = CsvFile::create(out.path()).unwrap();
    let result = render(&mut list, &mut csv).await;
    assert!(matches!(result, Err(ClientError::Transport(_))));
    assert!(out.path().join(FILE_NAME).exists());

    drop(csv);
    assert!(!out.path().join(FILE_NAME).exists());
}

#[cfg(target_os = "linux")]
#[test]
fn test_failed_flush_removes_csv() {
    use airgap_fs::client::output::RowWriter;

    let out = tempfile::tempdir().unwrap();
    let target = out.path().join(FILE_NAME);
    std::os::unix::fs::symlink("/dev/full", &target).unwrap();

    let mut csv = CsvFile::create(out.path()).unwrap();
    csv.write_row(&["a".to_string(), "b".to_string()]).unwrap();

    let err = csv.finish().unwrap_err();
    assert!(matches!(err, ClientError::Io(_)));
    assert!(std::fs::symlink_metadata(&target).is_err());
}
