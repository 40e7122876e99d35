use fusetune_device::MatmulPreference;
use test_case::test_case;

use crate::test::stub::{Behavior, StubBackend, StubStream, descriptors};
use crate::{Error, Fingerprint, MatmulCall, NoViableReason, Result, Score, Selection, Tuner, TunerConfig};

const WORKSPACE_BYTES: usize = 1024;

fn config(search_times: i64) -> TunerConfig {
    TunerConfig::builder().search_times(search_times).warmup_iterations(5).build()
}

fn select_with(backend: &StubBackend, config: &TunerConfig) -> Result<Selection<usize>> {
    let (desc, a, b, c) = descriptors();
    let stream = StubStream::new();
    let mut workspace = vec![0u8; WORKSPACE_BYTES];
    let call = MatmulCall::new(backend, &desc, &a, &b, &c);
    Tuner::new(config).select(Fingerprint::from_raw(7), call, &mut (), &stream, &mut workspace)
}

fn select(backend: &StubBackend) -> Result<Selection<usize>> {
    select_with(backend, &config(3))
}

fn no_viable_reason(result: Result<Selection<usize>>) -> NoViableReason {
    match result {
        Err(Error::NoViableStrategy { reason, fingerprint }) => {
            assert_eq!(fingerprint, Fingerprint::from_raw(7));
            reason
        }
        other => panic!("expected NoViableStrategy, got {other:?}"),
    }
}

#[test_case(&[4.0, 2.0, 3.0], 1; "middle")]
#[test_case(&[1.0, 2.0, 3.0], 0; "first")]
#[test_case(&[3.0, 2.0, 1.0], 2; "last")]
#[test_case(&[2.0, 2.0, 2.0], 0; "ties keep first")]
#[test_case(&[3.0, 1.0, 1.0], 1; "later tie keeps earlier")]
fn test_fastest_candidate_wins(timings: &[f32], expected: usize) {
    let backend = StubBackend::timed(timings);
    let selection = select(&backend).unwrap();

    assert_eq!(selection.plan, expected);
    assert_eq!(selection.report.winner, expected);
    assert_eq!(selection.report.warmup_failures, 0);
    assert_eq!(selection.report.winner_ms(), timings[expected]);
}

#[test]
fn test_scores_are_averages() {
    let backend = StubBackend::timed(&[2.0, 4.0]);
    let selection = select_with(&backend, &config(4)).unwrap();

    let expected = vec![Score::Completed { average_ms: 2.0 }, Score::Completed { average_ms: 4.0 }];
    assert_eq!(selection.report.scores, expected);
}

#[test]
fn test_execution_count() {
    let backend = StubBackend::timed(&[1.0, 1.0, 1.0]);
    select_with(&backend, &config(4)).unwrap();

    // Five warm-up runs on candidate 0, then four timed runs per candidate.
    assert_eq!(backend.executions(), 5 + 3 * 4);
    assert_eq!(backend.executions_of(0), 5 + 4);
    assert_eq!(backend.enumerations(), 1);
    assert_eq!(backend.events_created.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[test]
fn test_warmup_skips_failing_candidates() {
    let backend = StubBackend::new(vec![Behavior::Fails, Behavior::Fails, Behavior::Runs(2.0), Behavior::Runs(1.0)]);
    let selection = select(&backend).unwrap();

    assert!(selection.plan >= 2);
    assert_eq!(selection.plan, 3);
    assert_eq!(selection.report.warmup_failures, 2);
    assert_eq!(selection.report.scores[0], Score::Disqualified);
    assert_eq!(selection.report.scores[1], Score::Disqualified);
}

#[test]
fn test_warmup_failure_restarts_count() {
    let backend = StubBackend::new(vec![Behavior::FailsAfter(3, 1.0), Behavior::Runs(1.0)]);
    let selection = select(&backend).unwrap();

    assert_eq!(selection.plan, 1);
    assert_eq!(selection.report.warmup_failures, 1);
    // Three good runs and the failing one on candidate 0, one failed timed run.
    assert_eq!(backend.executions_of(0), 4 + 1);
    // A full warm-up on candidate 1, then its timed runs.
    assert_eq!(backend.executions_of(1), 5 + 3);
}

#[test]
fn test_all_candidates_fail_warmup() {
    let backend = StubBackend::new(vec![Behavior::Fails; 4]);
    assert_eq!(no_viable_reason(select(&backend)), NoViableReason::WarmupFailed);

    // Bounded by the returned list: each candidate was tried exactly once.
    assert_eq!(backend.executions(), 4);
    for index in 0..4 {
        assert_eq!(backend.executions_of(index), 1);
    }
}

#[test]
fn test_no_candidates() {
    let backend = StubBackend::new(Vec::new());
    assert_eq!(no_viable_reason(select(&backend)), NoViableReason::NoCandidates);
    assert_eq!(backend.executions(), 0);
    assert_eq!(backend.events_created.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn test_timed_failure_disqualifies_only_that_candidate() {
    let backend = StubBackend::new(vec![Behavior::Runs(3.0), Behavior::Fails, Behavior::Runs(2.0)]);
    let selection = select(&backend).unwrap();

    assert_eq!(selection.plan, 2);
    assert_eq!(selection.report.scores[1], Score::Disqualified);
    assert!(selection.report.scores[0].is_completed());
    // The failing candidate stops after its first repetition.
    assert_eq!(backend.executions_of(1), 1);
}

#[test]
fn test_first_candidate_disqualified_after_warmup() {
    let backend = StubBackend::new(vec![Behavior::FailsAfter(5, 1.0), Behavior::Runs(3.0)]);
    let selection = select(&backend).unwrap();

    assert_eq!(selection.plan, 1);
    assert_eq!(selection.report.warmup_failures, 0);
    assert_eq!(selection.report.scores[0], Score::Disqualified);
}

#[test]
fn test_no_candidate_completes_timing() {
    // Five warm-up runs succeed on candidate 0, then every timed run fails.
    let backend = StubBackend::new(vec![Behavior::FailsAfter(5, 1.0), Behavior::Fails]);
    let selection = select(&backend).unwrap();

    assert_eq!(selection.plan, 0);
    assert_eq!(selection.report.winner, 0);
    assert_eq!(selection.report.scores, vec![Score::Disqualified, Score::Disqualified]);
    assert_eq!(selection.report.winner_ms(), f32::MAX);
}

#[test]
fn test_heuristic_error() {
    let backend = StubBackend::timed(&[1.0]).with_heuristic_error();
    let err = select(&backend).unwrap_err();

    assert!(matches!(err, Error::Heuristic { .. }), "{err}");
    assert_eq!(backend.executions(), 0);
}

#[test]
fn test_event_error_is_fatal() {
    let backend = StubBackend::timed(&[1.0, 2.0]).with_event_error();
    let err = select(&backend).unwrap_err();
    assert!(matches!(err, Error::Timing { .. }), "{err}");
}

#[test]
fn test_preference_carries_workspace_size() {
    let backend = StubBackend::timed(&[1.0]);
    select(&backend).unwrap();

    let recorded = *backend.last_preference.lock();
    assert_eq!(recorded, Some((MatmulPreference::new(WORKSPACE_BYTES), 10)));
}

#[test]
fn test_candidate_limit() {
    let backend = StubBackend::timed(&[5.0; 12]);
    let selection = select(&backend).unwrap();
    assert_eq!(selection.report.candidates(), 10);

    let narrow = TunerConfig::builder().search_times(1).max_candidates(2).warmup_iterations(1).build();
    let backend = StubBackend::timed(&[5.0, 4.0, 1.0]);
    let selection = select_with(&backend, &narrow).unwrap();
    assert_eq!(selection.report.candidates(), 2);
    assert_eq!(selection.plan, 1);
}

#[test]
fn test_zero_warmup_iterations() {
    let backend = StubBackend::new(vec![Behavior::Fails, Behavior::Runs(1.0)]);
    let config = TunerConfig::builder().search_times(2).warmup_iterations(0).build();
    let selection = select_with(&backend, &config).unwrap();

    assert_eq!(selection.plan, 1);
    assert_eq!(selection.report.warmup_failures, 0);
}
