//! Integration tests for Store action broadcasting
//!
//! Observers (display boards, operator consoles) learn about state changes
//! through actions produced by effects. These tests cover the observation
//! and request-response paths without any queue domain code.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use kiosk_core::{effect::Effect, environment::Clock, reducer::Reducer, smallvec, SmallVec};
use kiosk_runtime::{Store, StoreError};
use kiosk_testing::{test_clock, FixedClock};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum BoardAction {
    /// Command: call the next number to a window
    Call { window: u8 },
    /// Event: a number was called
    Called { window: u8, number: u32 },
    /// Command: replay the chime for a window a number of times
    Chime { window: u8, times: u8 },
    /// Event: one chime played
    Chimed { window: u8, remaining: u8 },
    /// Event: chime sequence finished
    ChimeFinished { window: u8 },
}

#[derive(Debug, Clone, Default)]
struct BoardState {
    next_number: u32,
    chimes: Vec<u8>,
}

#[derive(Clone)]
struct BoardEnvironment {
    clock: FixedClock,
}

#[derive(Clone)]
struct BoardReducer;

impl Reducer for BoardReducer {
    type State = BoardState;
    type Action = BoardAction;
    type Environment = BoardEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let _ = env.clock.now();
        match action {
            BoardAction::Call { window } => {
                state.next_number += 1;
                smallvec![Effect::emit(BoardAction::Called {
                    window,
                    number: state.next_number,
                })]
            },
            BoardAction::Chime { window, times } => {
                smallvec![Effect::emit(BoardAction::Chimed {
                    window,
                    remaining: times,
                })]
            },
            BoardAction::Chimed { window, remaining } => {
                state.chimes.push(window);
                if remaining > 1 {
                    smallvec![Effect::Future(Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Some(BoardAction::Chimed {
                            window,
                            remaining: remaining - 1,
                        })
                    }))]
                } else {
                    smallvec![Effect::emit(BoardAction::ChimeFinished { window })]
                }
            },
            BoardAction::Called { .. } | BoardAction::ChimeFinished { .. } => {
                smallvec![Effect::None]
            },
        }
    }
}

fn board_store() -> Store<BoardState, BoardAction, BoardEnvironment, BoardReducer> {
    Store::new(
        BoardState::default(),
        BoardReducer,
        BoardEnvironment {
            clock: test_clock(),
        },
    )
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_send_and_wait_for_immediate() {
    let store = board_store();

    let result = assert_ok!(
        store
            .send_and_wait_for(
                BoardAction::Call { window: 1 },
                |action| matches!(action, BoardAction::Called { .. }),
                Duration::from_secs(1),
            )
            .await
    );

    assert_eq!(result, BoardAction::Called { window: 1, number: 1 });
}

#[tokio::test]
async fn test_send_and_wait_for_multi_step() {
    let store = board_store();

    let result = store
        .send_and_wait_for(
            BoardAction::Chime { window: 2, times: 3 },
            |action| matches!(action, BoardAction::ChimeFinished { window: 2 }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(result, BoardAction::ChimeFinished { window: 2 });
    let chimes = store.state(|s| s.chimes.clone()).await;
    assert_eq!(chimes, vec![2, 2, 2]);
}

#[tokio::test]
async fn test_send_and_wait_for_timeout() {
    let store = board_store();

    let result = store
        .send_and_wait_for(
            BoardAction::Call { window: 1 },
            |action| matches!(action, BoardAction::ChimeFinished { .. }),
            Duration::from_millis(50),
        )
        .await;

    assert!(matches!(result, Err(StoreError::Timeout)));
}

#[tokio::test]
async fn test_concurrent_callers_get_their_own_outcome() {
    let store = Arc::new(board_store());
    let mut handles = vec![];

    for window in 1..=4u8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .send_and_wait_for(
                    BoardAction::Call { window },
                    move |action| matches!(action, BoardAction::Called { window: w, .. } if *w == window),
                    Duration::from_secs(1),
                )
                .await
        }));
    }

    let mut numbers = Vec::new();
    for handle in handles {
        match handle.await.expect("task panicked").unwrap() {
            BoardAction::Called { number, .. } => numbers.push(number),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    // Calls were serialized: every caller got a distinct number
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_subscribe_actions_sees_effect_output_only() {
    let store = board_store();
    let mut rx = store.subscribe_actions();

    let mut handle = assert_ok!(store.send(BoardAction::Call { window: 3 }).await);
    assert_ok!(handle.wait_with_timeout(Duration::from_secs(1)).await);

    // The command itself is not broadcast, only the event its effect produced
    let first = assert_ok!(assert_ok!(tokio::time::timeout(Duration::from_secs(1), rx.recv()).await));
    assert_eq!(first, BoardAction::Called { window: 3, number: 1 });
    assert_err!(rx.try_recv());
}

#[tokio::test]
async fn test_no_subscribers_is_fine() {
    let store = board_store();

    for window in 0..10 {
        assert_ok!(store.send(BoardAction::Call { window }).await);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(store.state(|s| s.next_number).await, 10);
}
