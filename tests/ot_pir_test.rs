//! Integration test for OT-based PIR (§4.11): querier and data-holder
//! running over `InMemoryTransport` against a real candidate file on disk.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ppc_core::crypto::ecc::CurveType;
use ppc_core::crypto::hash::HashType;
use ppc_core::protocol::ot_pir::{run_client, run_server};
use ppc_core::transport::{InMemoryTransport, Transport};

static COUNTER: AtomicU64 = AtomicU64::new(0);

struct TempFile {
    path: std::path::PathBuf,
}

impl TempFile {
    fn new(rows: &[(&str, &str)]) -> Self {
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut path = std::env::temp_dir();
        path.push(format!("ppc-core-it-pir-{}-{id}.csv", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        for (k, v) in rows {
            writeln!(f, "{k},{v}").unwrap();
        }
        Self { path }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[tokio::test]
async fn finds_matching_row_and_reports_absence() {
    let file = TempFile::new(&[
        ("user-0001", "row-payload-1"),
        ("user-0002", "row-payload-2"),
        ("user-0003", "row-payload-3"),
    ]);
    let path = file.path.to_str().unwrap().to_string();

    let mem = Arc::new(InMemoryTransport::new());
    mem.register("server", "pir-it-1");
    mem.register("client", "pir-it-1");
    let transport: Arc<dyn Transport> = mem;

    let (t1, t2) = (Arc::clone(&transport), Arc::clone(&transport));
    let (client_res, server_res) = tokio::join!(
        run_client(
            t1,
            "pir-it-1",
            "server",
            "client",
            CurveType::P256,
            HashType::Sha256,
            b"user-0002",
            6,
        ),
        run_server(
            t2,
            "pir-it-1",
            "client",
            "server",
            CurveType::P256,
            HashType::Sha256,
            &path,
        ),
    );
    server_res.unwrap();
    assert_eq!(client_res.unwrap(), Some(b"row-payload-2".to_vec()));
}
