//! Enumeration engine: fan out across every registered backend, merge the
//! matches into wrapped tokens, and keep the caller's filters intact.
//!
//! Filters may carry a wrapped parent token. Backends compare native
//! identities, so the engine substitutes the parent's header for the call
//! and restores the wrapped form afterwards — on every exit path, via a
//! scope guard. Restoration order among filters is unspecified.

use std::ops::ControlFlow;

use accelgate_core::error::{AccelError, Result};
use accelgate_core::props::{ParentRef, Properties, PropertyField};
use accelgate_core::tokens::Token;

use crate::service::AccelService;

impl AccelService {
    /// Find resources matching `filters` across all backends.
    ///
    /// Two-call convention: pass no sink to get only the match count,
    /// then call again with a sink sized to that count. The returned
    /// count accrues across all backends even when the sink is full;
    /// filling the sink stops the fan-out early.
    ///
    /// An empty filter slice matches everything. A sink with
    /// `max_tokens == 0`, or `max_tokens > 0` without a sink, is an
    /// invalid combination and no backend is called.
    pub fn enumerate(
        &self,
        filters: &[Properties],
        max_tokens: u32,
        mut sink: Option<&mut Vec<Token>>,
    ) -> Result<u32> {
        match (&sink, max_tokens) {
            (Some(_), 0) => {
                tracing::error!("enumerate called with a sink and max_tokens == 0");
                return Err(AccelError::InvalidParam);
            }
            (None, max) if max > 0 => {
                tracing::error!("enumerate called with max_tokens > 0 and no sink");
                return Err(AccelError::InvalidParam);
            }
            _ => {}
        }

        // Unwrap any wrapped parent filters, remembering the original
        // tokens. The guard restores them LIFO on every exit path.
        let mut fixups = scopeguard::guard(Vec::<(usize, Token)>::new(), |list| {
            for (index, token) in list.into_iter().rev() {
                filters[index].lock().set_parent_token(token);
            }
        });

        for (index, filter) in filters.iter().enumerate() {
            let mut data = filter.lock();
            if !data.is_set(PropertyField::Parent) {
                continue;
            }
            match data.parent.take() {
                Some(ParentRef::Wrapped(token)) => {
                    let header = match self.tokens.header(&token) {
                        Ok(h) => h,
                        Err(err) => {
                            tracing::error!("invalid wrapped parent in filter");
                            data.parent = Some(ParentRef::Wrapped(token));
                            drop(data);
                            return Err(err);
                        }
                    };
                    data.parent = Some(ParentRef::Header(header));
                    fixups.push((index, token));
                }
                other => {
                    // Already in native form.
                    data.parent = other;
                }
            }
        }

        let want_tokens = sink.is_some();
        let filter_refs: Vec<&Properties> = filters.iter().collect();

        let mut matches: u32 = 0;
        let mut errors: u32 = 0;
        let mut wrapped: Vec<Token> = Vec::new();

        self.plugins.for_each(|adapter| {
            let space = if want_tokens {
                (max_tokens as usize).saturating_sub(wrapped.len())
            } else {
                0
            };
            if want_tokens && space == 0 {
                return ControlFlow::Break(());
            }

            let found = match adapter.enumerate(&filter_refs, space) {
                // Absent capability: skip this backend silently.
                Err(AccelError::NotSupported) => return ControlFlow::Continue(()),
                // Nothing behind this backend: zero matches, not an error.
                Err(AccelError::NoDriver) | Err(AccelError::NotFound) => {
                    return ControlFlow::Continue(())
                }
                Err(err) => {
                    tracing::debug!(backend = adapter.name(), %err, "enumeration failed");
                    errors += 1;
                    return ControlFlow::Continue(());
                }
                Ok(found) => found,
            };

            matches += found.matches as u32;

            if want_tokens {
                for native in found.tokens.into_iter().take(space) {
                    wrapped.push(self.tokens.allocate(native, adapter.clone()));
                }
                if wrapped.len() == max_tokens as usize {
                    return ControlFlow::Break(());
                }
            }

            ControlFlow::Continue(())
        });

        if let Some(sink) = sink.as_mut() {
            sink.append(&mut wrapped);
        }

        if errors > 0 {
            return Err(AccelError::Exception);
        }
        Ok(matches)
    }
}
