//! Handle-registry integration tests: tracking, sweep, and force-close.

mod common;

use std::sync::Arc;

use common::{test_frame, StubDecodeEngine, StubEncodeEngine};
use frameshift::{
    FrameReader, FrameWriter, FrameshiftError, HandleKind, HandleRegistry, SinkOptions,
    SourceOptions,
};

#[test]
fn open_handles_lists_kind_and_target() {
    let registry = Arc::new(HandleRegistry::new());
    let decode = StubDecodeEngine::new(3);
    let encode = StubEncodeEngine::new();

    let _reader =
        FrameReader::open_with(&decode, "in.mp4", SourceOptions::new(), &registry).expect("open");
    let _writer =
        FrameWriter::open_with(&encode, "out.mp4", 30.0, SinkOptions::new(), &registry)
            .expect("open");

    let handles = registry.open_handles();
    assert_eq!(handles.len(), 2);
    assert_eq!(handles[0].1, HandleKind::Reader);
    assert_eq!(handles[0].2.to_str(), Some("in.mp4"));
    assert_eq!(handles[1].1, HandleKind::Writer);
    assert_eq!(handles[1].2.to_str(), Some("out.mp4"));
}

#[test]
fn close_all_sweeps_open_handles() {
    let registry = Arc::new(HandleRegistry::new());
    let decode = StubDecodeEngine::new(3);
    let encode = StubEncodeEngine::new();

    let mut reader =
        FrameReader::open_with(&decode, "in.mp4", SourceOptions::new(), &registry).expect("open");
    let mut writer =
        FrameWriter::open_with(&encode, "out.mp4", 30.0, SinkOptions::new(), &registry)
            .expect("open");
    writer.write(test_frame(0, 4, 4)).expect("write");

    assert_eq!(registry.close_all().expect("close_all"), 2);
    assert!(registry.is_empty());

    // The sink was finalized by the sweep, and both handles now observe
    // the closed state.
    assert_eq!(encode.recording.finished(), 1);
    assert!(matches!(
        reader.next_frame(),
        Err(FrameshiftError::HandleClosed)
    ));
    assert!(matches!(
        writer.write(test_frame(1, 4, 4)),
        Err(FrameshiftError::HandleClosed)
    ));
}

#[test]
fn close_all_on_empty_registry_is_a_no_op() {
    let registry = HandleRegistry::new();
    assert_eq!(registry.close_all().expect("close_all"), 0);
}

#[test]
fn explicit_close_beats_the_sweep() {
    let registry = Arc::new(HandleRegistry::new());
    let decode = StubDecodeEngine::new(3);

    let mut reader =
        FrameReader::open_with(&decode, "in.mp4", SourceOptions::new(), &registry).expect("open");
    reader.close().expect("close");

    // Nothing left to sweep.
    assert_eq!(registry.close_all().expect("close_all"), 0);
}

#[test]
fn dropped_handles_do_not_linger() {
    let registry = Arc::new(HandleRegistry::new());
    let decode = StubDecodeEngine::new(3);

    {
        let _reader = FrameReader::open_with(&decode, "in.mp4", SourceOptions::new(), &registry)
            .expect("open");
        assert_eq!(registry.len(), 1);
    }
    assert!(registry.is_empty());
    assert_eq!(registry.close_all().expect("close_all"), 0);
}

#[test]
fn registries_are_independent() {
    let registry_a = Arc::new(HandleRegistry::new());
    let registry_b = Arc::new(HandleRegistry::new());
    let decode = StubDecodeEngine::new(3);

    let mut reader_a =
        FrameReader::open_with(&decode, "a.mp4", SourceOptions::new(), &registry_a).expect("open");
    let _reader_b =
        FrameReader::open_with(&decode, "b.mp4", SourceOptions::new(), &registry_b).expect("open");

    registry_a.close_all().expect("close_all");
    assert!(registry_a.is_empty());
    assert_eq!(registry_b.len(), 1);

    assert!(matches!(
        reader_a.next_frame(),
        Err(FrameshiftError::HandleClosed)
    ));
}
