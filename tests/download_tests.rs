mod common;

use common::{content, spawn_peer, torrent_for, Behavior};

use leech::{DownloadConfig, Error, ProgressSample};

use crossbeam_channel::unbounded;

use std::time::Duration;

const PIECE_LENGTH: u32 = 16384;
const FILE_LENGTH: usize = 40000;

#[test]
fn pieces_are_collected_from_peers_holding_disjoint_sets() {
    let data = content(FILE_LENGTH);
    let torrent = torrent_for(&data, PIECE_LENGTH);
    assert_eq!(torrent.piece_count(), 3);

    let first = spawn_peer(&torrent, &data, &[0, 2], Behavior::Serve);
    let second = spawn_peer(&torrent, &data, &[1], Behavior::Serve);

    let (progress_tx, progress_rx) = unbounded::<ProgressSample>();
    let downloaded = torrent
        .download(
            &[first.peer, second.peer],
            &DownloadConfig::default(),
            &progress_tx,
        )
        .unwrap();

    assert_eq!(downloaded, data);

    let first_log = first.log.lock().unwrap();
    assert!(first_log.requests.iter().all(|&(index, _, _)| index != 1));
    assert!(first_log.requests.contains(&(2, 0, 7232)));
    let second_log = second.log.lock().unwrap();
    assert!(second_log.requests.iter().all(|&(index, _, _)| index == 1));
    drop(first_log);
    drop(second_log);

    // Each peer hears about the pieces downloaded from it.
    assert_eq!(first.haves(2), vec![0, 2]);
    assert_eq!(second.haves(1), vec![1]);

    let samples: Vec<ProgressSample> = progress_rx.try_iter().collect();
    assert_eq!(samples.len(), 3);
    assert_eq!(
        samples.iter().map(|s| s.completed).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(samples[2].fraction(), 1.0);
    let mut indices: Vec<u32> = samples.iter().map(|s| s.index).collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[test]
fn corrupt_piece_is_downloaded_again() {
    let data = content(FILE_LENGTH);
    let torrent = torrent_for(&data, PIECE_LENGTH);
    let peer = spawn_peer(&torrent, &data, &[0, 1, 2], Behavior::CorruptFirst(1));

    let downloaded = torrent
        .download(&[peer.peer], &DownloadConfig::default(), &())
        .unwrap();
    assert_eq!(downloaded, data);

    let log = peer.log.lock().unwrap();
    let retries = log
        .requests
        .iter()
        .filter(|&&request| request == (1, 0, PIECE_LENGTH))
        .count();
    assert_eq!(retries, 2);
}

#[test]
fn piece_failing_every_attempt_stalls_the_download() {
    let data = content(FILE_LENGTH);
    let torrent = torrent_for(&data, PIECE_LENGTH);
    let peer = spawn_peer(&torrent, &data, &[0, 1, 2], Behavior::CorruptAlways(1));

    let config = DownloadConfig {
        max_attempts: Some(3),
        ..DownloadConfig::default()
    };
    let err = torrent.download(&[peer.peer], &config, &()).unwrap_err();
    assert!(matches!(err, Error::Stalled(1)), "unexpected error: {:?}", err);
}

#[test]
fn choking_peer_hands_its_piece_back() {
    let data = content(FILE_LENGTH);
    let torrent = torrent_for(&data, PIECE_LENGTH);
    let choker = spawn_peer(&torrent, &data, &[0, 1, 2], Behavior::ChokeThenClose);
    let good = spawn_peer(&torrent, &data, &[0, 1, 2], Behavior::Serve);

    let downloaded = torrent
        .download(&[choker.peer, good.peer], &DownloadConfig::default(), &())
        .unwrap();
    assert_eq!(downloaded, data);
}

#[test]
fn choking_peer_alone_leaves_no_workers() {
    let data = content(FILE_LENGTH);
    let torrent = torrent_for(&data, PIECE_LENGTH);
    let choker = spawn_peer(&torrent, &data, &[0, 1, 2], Behavior::ChokeThenClose);

    let err = torrent
        .download(&[choker.peer], &DownloadConfig::default(), &())
        .unwrap_err();
    assert!(matches!(err, Error::NoPeers), "unexpected error: {:?}", err);
}

#[test]
fn peer_for_another_torrent_is_skipped() {
    let data = content(FILE_LENGTH);
    let torrent = torrent_for(&data, PIECE_LENGTH);
    let stranger = spawn_peer(&torrent, &data, &[0, 1, 2], Behavior::WrongInfoHash);
    let good = spawn_peer(&torrent, &data, &[0, 1, 2], Behavior::Serve);

    let downloaded = torrent
        .download(&[stranger.peer, good.peer], &DownloadConfig::default(), &())
        .unwrap();
    assert_eq!(downloaded, data);
    assert!(stranger.log.lock().unwrap().requests.is_empty());
}

#[test]
fn connection_gate_still_reaches_every_peer() {
    let data = content(FILE_LENGTH);
    let torrent = torrent_for(&data, PIECE_LENGTH);
    let first = spawn_peer(&torrent, &data, &[0], Behavior::Serve);
    let second = spawn_peer(&torrent, &data, &[1], Behavior::Serve);
    let third = spawn_peer(&torrent, &data, &[2], Behavior::Serve);

    let config = DownloadConfig {
        max_connecting: Some(1),
        ..DownloadConfig::default()
    };
    let downloaded = torrent
        .download(&[first.peer, second.peer, third.peer], &config, &())
        .unwrap();
    assert_eq!(downloaded, data);
}

#[test]
fn churning_peers_do_not_stall_a_download_a_seed_can_finish() {
    let data = content(FILE_LENGTH);
    let torrent = torrent_for(&data, PIECE_LENGTH);

    let mut peers: Vec<_> = (0..12)
        .map(|_| spawn_peer(&torrent, &data, &[0, 1, 2], Behavior::ChokeThenClose).peer)
        .collect();
    peers.push(spawn_peer(&torrent, &data, &[0, 1, 2], Behavior::Serve).peer);

    // Twelve broken connections over three pieces would exhaust this limit
    // if dropped connections counted against the pieces.
    let config = DownloadConfig {
        max_attempts: Some(2),
        ..DownloadConfig::default()
    };
    let downloaded = torrent.download(&peers, &config, &()).unwrap();
    assert_eq!(downloaded, data);
}

#[test]
fn peer_without_pieces_backs_off_without_using_attempts() {
    let data = content(FILE_LENGTH);
    let torrent = torrent_for(&data, PIECE_LENGTH);
    let empty = spawn_peer(&torrent, &data, &[], Behavior::Serve);
    let seed = spawn_peer(&torrent, &data, &[0, 1, 2], Behavior::Serve);

    let config = DownloadConfig {
        max_attempts: Some(1),
        idle_backoff: Duration::from_secs(1),
        ..DownloadConfig::default()
    };
    let downloaded = torrent
        .download(&[empty.peer, seed.peer], &config, &())
        .unwrap();
    assert_eq!(downloaded, data);
    assert!(empty.log.lock().unwrap().requests.is_empty());
}
