//! Integration test for CM2020 OT-extension PSI (§4.10): full receiver/
//! sender run over `InMemoryTransport`, checking both parties agree on
//! the intersection.

use std::sync::Arc;

use ppc_core::config::Cm2020Params;
use ppc_core::crypto::ecc::CurveType;
use ppc_core::crypto::hash::HashType;
use ppc_core::protocol::cm2020::{run_receiver, run_sender};
use ppc_core::transport::{InMemoryTransport, Transport};

fn items(words: &[&str]) -> Vec<Vec<u8>> {
    words.iter().map(|w| w.as_bytes().to_vec()).collect()
}

#[tokio::test]
async fn both_parties_agree_on_intersection() {
    let mem = Arc::new(InMemoryTransport::new());
    mem.register("sender", "cm-1");
    mem.register("receiver", "cm-1");
    let transport: Arc<dyn Transport> = mem;

    let receiver_set = items(&["apple", "banana", "cherry", "date"]);
    let sender_set = items(&["banana", "date", "elder", "fig"]);
    let max_input_size = receiver_set.len().max(sender_set.len()) as u64;

    let params = Cm2020Params {
        bucket_number: 64,
        ..Cm2020Params::default()
    };

    let (t1, t2) = (Arc::clone(&transport), Arc::clone(&transport));
    let (receiver_res, sender_res) = tokio::join!(
        run_receiver(
            t1,
            "cm-1",
            "sender",
            "receiver",
            CurveType::P256,
            HashType::Sha256,
            params,
            &receiver_set,
            max_input_size,
            false,
            true,
        ),
        run_sender(
            t2,
            "cm-1",
            "receiver",
            "sender",
            CurveType::P256,
            HashType::Sha256,
            &sender_set,
        ),
    );

    let receiver_indices = receiver_res.unwrap();
    let sender_indices = sender_res.unwrap().unwrap();

    let receiver_matched: std::collections::HashSet<_> = receiver_indices
        .iter()
        .map(|&i| receiver_set[i as usize].clone())
        .collect();
    let sender_matched: std::collections::HashSet<_> = sender_indices
        .iter()
        .map(|&i| sender_set[i as usize].clone())
        .collect();

    let expected: std::collections::HashSet<_> = items(&["banana", "date"]).into_iter().collect();
    assert_eq!(receiver_matched, expected);
    assert_eq!(sender_matched, expected);
}

#[tokio::test]
async fn low_bandwidth_run_over_a_1024_item_universe_finds_the_planned_intersection() {
    let mem = Arc::new(InMemoryTransport::new());
    mem.register("sender", "cm-lb-1");
    mem.register("receiver", "cm-lb-1");
    let transport: Arc<dyn Transport> = mem;

    let shared: Vec<Vec<u8>> = (0..512).map(|i| format!("shared-{i}").into_bytes()).collect();
    let receiver_only: Vec<Vec<u8>> = (0..512)
        .map(|i| format!("receiver-only-{i}").into_bytes())
        .collect();
    let sender_only: Vec<Vec<u8>> = (0..512)
        .map(|i| format!("sender-only-{i}").into_bytes())
        .collect();

    let mut receiver_set = shared.clone();
    receiver_set.extend(receiver_only);
    let mut sender_set = shared.clone();
    sender_set.extend(sender_only);

    let params = Cm2020Params {
        bucket_number: 512,
        ..Cm2020Params::default()
    };

    let (t1, t2) = (Arc::clone(&transport), Arc::clone(&transport));
    let (receiver_res, sender_res) = tokio::join!(
        run_receiver(
            t1,
            "cm-lb-1",
            "sender",
            "receiver",
            CurveType::P256,
            HashType::Sha256,
            params,
            &receiver_set,
            1024,
            true,
            true,
        ),
        run_sender(
            t2,
            "cm-lb-1",
            "receiver",
            "sender",
            CurveType::P256,
            HashType::Sha256,
            &sender_set,
        ),
    );

    let receiver_indices = receiver_res.unwrap();
    let sender_indices = sender_res.unwrap().unwrap();
    assert_eq!(receiver_indices.len(), 512);

    let receiver_matched: std::collections::HashSet<_> = receiver_indices
        .iter()
        .map(|&i| receiver_set[i as usize].clone())
        .collect();
    let sender_matched: std::collections::HashSet<_> = sender_indices
        .iter()
        .map(|&i| sender_set[i as usize].clone())
        .collect();
    let expected: std::collections::HashSet<_> = shared.into_iter().collect();
    assert_eq!(receiver_matched, expected);
    assert_eq!(sender_matched, expected);
}
