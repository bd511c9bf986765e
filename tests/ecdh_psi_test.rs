//! Integration tests for ECDH-PSI (§4.9): full client/server run over
//! `InMemoryTransport`, in-process.

use std::sync::Arc;

use ppc_core::crypto::ecc::CurveType;
use ppc_core::crypto::hash::HashType;
use ppc_core::protocol::ecdh_psi::{run_client, run_server, EcdhPsiParams};
use ppc_core::transport::{InMemoryTransport, Transport};

fn items(words: &[&str]) -> Vec<Vec<u8>> {
    words.iter().map(|w| w.as_bytes().to_vec()).collect()
}

#[tokio::test]
async fn intersection_matches_shared_items() {
    let mem = Arc::new(InMemoryTransport::new());
    mem.register("server", "t1");
    mem.register("client", "t1");
    let transport: Arc<dyn Transport> = mem;

    let x = items(&["alice", "bob", "carol", "dave"]);
    let y = items(&["bob", "dave", "erin", "frank"]);

    let params = EcdhPsiParams {
        curve: CurveType::P256,
        hash: HashType::Sha256,
        ..EcdhPsiParams::default()
    };

    let (t1, t2) = (Arc::clone(&transport), Arc::clone(&transport));
    let (client_res, server_res) = tokio::join!(
        run_client(t1, "t1", "server", "client", params, &x),
        run_server(t2, "t1", "client", "server", params, &y),
    );

    server_res.unwrap();
    let intersection = client_res.unwrap();
    let expected: std::collections::HashSet<Vec<u8>> = items(&["bob", "dave"]).into_iter().collect();
    assert_eq!(intersection, expected);
}

#[tokio::test]
async fn disjoint_sets_yield_empty_intersection() {
    let mem = Arc::new(InMemoryTransport::new());
    mem.register("server", "t2");
    mem.register("client", "t2");
    let transport: Arc<dyn Transport> = mem;

    let x = items(&["alice"]);
    let y = items(&["zeke"]);
    let params = EcdhPsiParams::default();

    let (t1, t2) = (Arc::clone(&transport), Arc::clone(&transport));
    let (client_res, server_res) = tokio::join!(
        run_client(t1, "t2", "server", "client", params, &x),
        run_server(t2, "t2", "client", "server", params, &y),
    );

    server_res.unwrap();
    assert!(client_res.unwrap().is_empty());
}
