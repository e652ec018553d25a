//! Test doubles shared by the unit tests in this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::api::{ApiError, ApiRequest, PartnerApi};

/// Partner API that hands out `tok-<user>-<call>` and records habit reports.
#[derive(Default)]
pub struct FakeApi {
    calls: AtomicUsize,
    completed: AtomicUsize,
    gate: Option<Arc<Notify>>,
    fail_status: Mutex<Option<u16>>,
    pub habit_tokens: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn fail_with(&self, status: Option<u16>) {
        *self.fail_status.lock() = status;
    }
}

impl PartnerApi for FakeApi {
    fn authenticate_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<String, ApiError>> {
        async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.completed.fetch_add(1, Ordering::SeqCst);

            let fail_status = *self.fail_status.lock();
            match fail_status {
                Some(status) => Err(ApiError::from_status(
                    ApiRequest::CreateBearerToken,
                    reqwest::StatusCode::from_u16(status).unwrap(),
                    "fake failure",
                )),
                None => Ok(format!("tok-{}-{}", user_id, call)),
            }
        }
        .boxed()
    }

    fn complete_daily_habit<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<(), ApiError>> {
        async move {
            self.habit_tokens.lock().push(token.to_string());
            Ok(())
        }
        .boxed()
    }
}

/// Yield until `expected` fetches have returned from the fake.
pub async fn wait_for_completion(api: &FakeApi, expected: usize) {
    for _ in 0..1000 {
        if api.completed() >= expected {
            // the fetch task persists before yielding again
            tokio::task::yield_now().await;
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("fetch never completed");
}

