// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `network::<T>()` subscription word.

use crate::hash::TypeHash;
use crate::service::NetState;
use reflex_core::{BindError, FetchContext, Message};
use reflex_runtime::{BindContext, Source};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

/// A value received from a peer plant.
#[derive(Debug, Clone)]
pub struct FromNetwork<T> {
    /// Data address of the sending plant.
    pub source: SocketAddr,
    pub data: T,
}

/// Subscribe to emissions of `T` from peer plants.
///
/// Binding registers a deserializer keyed by `T`'s wire hash; matching
/// data packets are decoded and re-emitted locally as
/// [`FromNetwork<T>`], which this word triggers on.
pub fn network<T>() -> NetworkWord<T>
where
    T: DeserializeOwned + Message,
{
    NetworkWord { _marker: PhantomData }
}

pub struct NetworkWord<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Source for NetworkWord<T>
where
    T: DeserializeOwned + Message,
{
    type Output = Arc<FromNetwork<T>>;

    fn bind(&self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        ctx.bind_trigger::<FromNetwork<T>>();
        let state = ctx.extension::<NetState>();
        let env = ctx.environment();
        let hash = TypeHash::of::<T>();
        state.register_codec(
            hash,
            Arc::new(move |source, payload| {
                match serde_json::from_value::<T>(payload.clone()) {
                    Ok(data) => env.emit(FromNetwork { source, data }),
                    Err(error) => {
                        tracing::debug!(%source, %hash, %error, "payload decode failed");
                    }
                }
            }),
        );
        Ok(())
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Option<Self::Output> {
        ctx.cache.latest::<FromNetwork<T>>()
    }
}

#[cfg(test)]
#[path = "words_tests.rs"]
mod tests;
