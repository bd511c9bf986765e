//! OT-based PIR (C11), §4.11: a 1-of-n base OT wrapped in HELLO_RECEIVER /
//! RESULTS framing, with the data holder's candidate set drawn from a
//! prefix-filtered scan of a flat `id,record` file.
//!
//! Grounded on `wedpr-computing/ppc-pir/src/OtPIRImpl.{h,cpp}`'s query/
//! server pair for the message flow, and on `crypto::base_ot` for the OT
//! itself. `split_lines`'s CR/LF/CRLF handling has no example counterpart
//! in the retrieved pack — it's a from-scratch helper, not ported from
//! anywhere.

use std::fs::File;
use std::sync::Arc;

use crate::crypto::base_ot::{BaseOtReceiver, BaseOtSender, ReceiverEnvelope, SenderMessage};
use crate::crypto::ecc::{CurveType, EcGroup};
use crate::crypto::hash::{hash, HashType};
use crate::error::PpcResult;
use crate::protocol::framing::{
    AlgorithmId, FramedMessage, MessageType, PirEnvelopeWire, PirHello, PirResults, TaskType,
};
use crate::transport::Transport;

async fn send_framed(
    transport: &dyn Transport,
    peer_id: &str,
    task_id: &str,
    sender_id: &str,
    message_type: MessageType,
    seq: u64,
    payload: Vec<u8>,
) -> PpcResult<()> {
    let msg = FramedMessage::new(
        TaskType::Pir,
        AlgorithmId::OtPir,
        message_type,
        seq,
        task_id,
        sender_id,
        &[],
        payload,
    )?;
    transport.send(peer_id, msg).await
}

async fn recv_typed(
    transport: &dyn Transport,
    self_id: &str,
    task_id: &str,
    expected: MessageType,
) -> PpcResult<FramedMessage> {
    loop {
        let msg = transport.recv(self_id, task_id).await?;
        if std::mem::discriminant(&msg.message_type) == std::mem::discriminant(&expected) {
            return Ok(msg);
        }
    }
}

/// Splits `data` on bare CR, bare LF, or CRLF, matching however the
/// candidate file happens to have been produced.
fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'\n' => {
                lines.push(&data[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&data[start..i]);
                i += 1;
                if i < data.len() && data[i] == b'\n' {
                    i += 1;
                }
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < data.len() {
        lines.push(&data[start..]);
    }
    lines
}

/// Scans `path` for `id,record` lines whose `hash(hash_ty, id)` starts with
/// `prefix` (§4.11 "candidate selection"). The file is expected not to
/// change for the duration of the scan; the mmap is read-only.
pub fn scan_candidates(
    path: &str,
    hash_ty: HashType,
    prefix: &[u8],
) -> PpcResult<Vec<(Vec<u8>, Vec<u8>)>> {
    let file = File::open(path)?;
    // SAFETY: read-only mapping of a file this process opened; the usual
    // mmap caveat (another process truncating the file mid-scan) applies
    // and is accepted here as it is in the teacher's file-backed readers.
    let mmap = unsafe { memmap2::Mmap::map(&file)? };

    let mut out = Vec::new();
    for line in split_lines(&mmap) {
        if line.is_empty() {
            continue;
        }
        let Some(comma) = line.iter().position(|&b| b == b',') else {
            continue;
        };
        let id = &line[..comma];
        let record = &line[comma + 1..];
        let digest = hash(hash_ty, id)?;
        if digest.len() >= prefix.len() && &digest[..prefix.len()] == prefix {
            out.push((id.to_vec(), record.to_vec()));
        }
    }
    Ok(out)
}

/// Runs the querier side: commits to `search_id` via base OT, sends
/// HELLO_RECEIVER, and decrypts whichever returned envelope (if any)
/// matches. Returns `None` on "not found" (§4.8 / §4.11).
pub async fn run_client(
    transport: Arc<dyn Transport>,
    task_id: &str,
    peer_id: &str,
    self_id: &str,
    curve: CurveType,
    hash_ty: HashType,
    search_id: &[u8],
    prefix_len: usize,
) -> PpcResult<Option<Vec<u8>>> {
    let (sender, hello) = BaseOtSender::new(curve, hash_ty, search_id, prefix_len)?;

    send_framed(
        transport.as_ref(),
        peer_id,
        task_id,
        self_id,
        MessageType::PirHello,
        0,
        crate::protocol::bounded::to_bytes(&PirHello {
            search_id_prefix: hello.prefix.clone(),
            point_x: hello.x.to_bytes(),
            point_y: hello.y.to_bytes(),
            point_z: hello.z.to_bytes(),
            prefix_length: prefix_len as u32,
        })?,
    )
    .await?;

    let results_msg = recv_typed(transport.as_ref(), self_id, task_id, MessageType::PirResults).await?;
    let results: PirResults = crate::protocol::bounded::from_bytes(&results_msg.payload)?;

    let group = EcGroup::new(curve);
    let envelopes: Vec<ReceiverEnvelope> = results
        .envelopes
        .into_inner()
        .into_iter()
        .map(|wire| {
            Ok(ReceiverEnvelope {
                w: group.point_from_bytes(&wire.w)?,
                enc_key: wire.enc_key,
                enc_record: wire.enc_record,
            })
        })
        .collect::<PpcResult<_>>()?;

    sender.finish_sender(&envelopes)
}

/// Runs the data-holder side: receives HELLO_RECEIVER, scans `file_path`
/// for prefix-matching candidates, and replies with one OT envelope per
/// match.
pub async fn run_server(
    transport: Arc<dyn Transport>,
    task_id: &str,
    peer_id: &str,
    self_id: &str,
    curve: CurveType,
    hash_ty: HashType,
    file_path: &str,
) -> PpcResult<()> {
    let hello_msg = recv_typed(transport.as_ref(), self_id, task_id, MessageType::PirHello).await?;
    let hello: PirHello = crate::protocol::bounded::from_bytes(&hello_msg.payload)?;

    let group = EcGroup::new(curve);
    let sender_msg = SenderMessage {
        x: group.point_from_bytes(&hello.point_x)?,
        y: group.point_from_bytes(&hello.point_y)?,
        z: group.point_from_bytes(&hello.point_z)?,
        prefix: hello.search_id_prefix.clone(),
    };

    let candidates = scan_candidates(file_path, hash_ty, &hello.search_id_prefix)?;

    let receiver = BaseOtReceiver::new(curve, hash_ty);
    let envelopes = receiver.generate_message(&sender_msg, &candidates)?;
    let wire_envelopes: Vec<PirEnvelopeWire> = envelopes
        .into_iter()
        .map(|e| PirEnvelopeWire {
            w: e.w.to_bytes(),
            enc_key: e.enc_key,
            enc_record: e.enc_record,
        })
        .collect();

    send_framed(
        transport.as_ref(),
        peer_id,
        task_id,
        self_id,
        MessageType::PirResults,
        0,
        crate::protocol::bounded::to_bytes(&PirResults {
            envelopes: crate::protocol::bounded::BoundedVec::new(wire_envelopes).ok_or_else(|| {
                crate::error::PpcError::DataFormatError("too many PIR candidates for one envelope".into())
            })?,
        })?,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryTransport;

    fn write_candidate_file(rows: &[(&str, &str)]) -> tempfile_path::TempFile {
        let mut content = String::new();
        for (id, record) in rows {
            content.push_str(id);
            content.push(',');
            content.push_str(record);
            content.push_str("\r\n");
        }
        tempfile_path::TempFile::new(&content)
    }

    /// Minimal scratch-file helper so the test doesn't pull in a tempfile
    /// crate dependency just for this.
    mod tempfile_path {
        use std::io::Write;
        use std::sync::atomic::{AtomicU64, Ordering};

        static COUNTER: AtomicU64 = AtomicU64::new(0);

        pub struct TempFile {
            pub path: std::path::PathBuf,
        }

        impl TempFile {
            pub fn new(content: &str) -> Self {
                let id = COUNTER.fetch_add(1, Ordering::Relaxed);
                let mut path = std::env::temp_dir();
                path.push(format!("ppc-core-pir-test-{}-{id}.csv", std::process::id()));
                let mut f = std::fs::File::create(&path).unwrap();
                f.write_all(content.as_bytes()).unwrap();
                Self { path }
            }
        }

        impl Drop for TempFile {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    #[test]
    fn split_lines_handles_lf_cr_and_crlf() {
        let data = b"a\nb\r\nc\rd";
        let lines = split_lines(data);
        assert_eq!(lines, vec![b"a".as_ref(), b"b".as_ref(), b"c".as_ref(), b"d".as_ref()]);
    }

    #[test]
    fn scan_candidates_filters_by_hash_prefix() {
        let file = write_candidate_file(&[
            ("row-1099", "payload-1099"),
            ("testmsg1100", "payload-1100"),
            ("row-1101", "payload-1101"),
        ]);
        let hash_ty = HashType::Sha256;
        let target = hash(hash_ty, b"testmsg1100").unwrap();
        let prefix = target[..6].to_vec();

        let found = scan_candidates(file.path.to_str().unwrap(), hash_ty, &prefix).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, b"testmsg1100");
        assert_eq!(found[0].1, b"payload-1100");
    }

    #[tokio::test]
    async fn client_server_round_trip_finds_matching_row() {
        let file = write_candidate_file(&[
            ("row-1099", "payload-1099"),
            ("testmsg1100", "payload-1100"),
            ("row-1101", "payload-1101"),
        ]);

        let mem = Arc::new(InMemoryTransport::new());
        mem.register("server", "task-pir");
        mem.register("client", "task-pir");
        let transport: Arc<dyn Transport> = mem;

        let curve = CurveType::P256;
        let hash_ty = HashType::Sha256;
        let path = file.path.to_str().unwrap().to_string();

        let t1 = Arc::clone(&transport);
        let t2 = Arc::clone(&transport);
        let (client_result, server_result) = tokio::join!(
            run_client(
                t1,
                "task-pir",
                "server",
                "client",
                curve,
                hash_ty,
                b"testmsg1100",
                6
            ),
            run_server(t2, "task-pir", "client", "server", curve, hash_ty, &path)
        );

        server_result.unwrap();
        assert_eq!(client_result.unwrap(), Some(b"payload-1100".to_vec()));
    }

    #[tokio::test]
    async fn client_server_round_trip_reports_not_found() {
        let file = write_candidate_file(&[("row-1", "payload-1")]);

        let mem = Arc::new(InMemoryTransport::new());
        mem.register("server", "task-pir-2");
        mem.register("client", "task-pir-2");
        let transport: Arc<dyn Transport> = mem;

        let curve = CurveType::P256;
        let hash_ty = HashType::Sha256;
        let path = file.path.to_str().unwrap().to_string();

        let t1 = Arc::clone(&transport);
        let t2 = Arc::clone(&transport);
        let (client_result, server_result) = tokio::join!(
            run_client(t1, "task-pir-2", "server", "client", curve, hash_ty, b"absent", 6),
            run_server(t2, "task-pir-2", "client", "server", curve, hash_ty, &path)
        );

        server_result.unwrap();
        assert_eq!(client_result.unwrap(), None);
    }
}
