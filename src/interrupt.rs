/*
 * aurforge - AUR helper with recursive dependency builds.
 * Copyright (C) 2025  aurforge contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Ctrl-C handling.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::error::{AurforgeError, AurforgeResult};

/// Shared flag set once SIGINT has been received
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task that raises the flag on Ctrl-C.
    ///
    /// Must be called from within a multi-threaded tokio runtime so the
    /// listener keeps running while the main task blocks on makepkg.
    pub fn listen(&self) {
        let interrupt = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received");
                interrupt.trigger();
            }
        });
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Interrupted)` once the flag is raised
    pub fn check(&self) -> AurforgeResult<()> {
        if self.is_set() {
            Err(AurforgeError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Resolves once the flag is raised
    pub async fn cancelled(&self) {
        loop {
            // Register before reading the flag so a concurrent trigger is not missed.
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }

    /// Run `future` unless the flag is raised first, in which case it is
    /// dropped and `Err(Interrupted)` returned.
    pub async fn guard<T, F>(&self, future: F) -> AurforgeResult<T>
    where
        F: Future<Output = AurforgeResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(AurforgeError::Interrupted),
            result = future => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trigger_is_shared_between_clones() {
        let interrupt = Interrupt::new();
        let clone = interrupt.clone();
        assert!(clone.check().is_ok());

        interrupt.trigger();
        assert!(clone.is_set());
        assert!(matches!(clone.check(), Err(AurforgeError::Interrupted)));
    }

    #[tokio::test]
    async fn test_cancelled_wakes_pending_waiter() {
        let interrupt = Interrupt::new();
        let trigger = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            interrupt.trigger();
        };
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(interrupt.cancelled(), trigger)
        })
        .await;
        assert!(waited.is_ok());

        // Already raised: returns at once
        tokio::time::timeout(Duration::from_secs(1), interrupt.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_guard_drops_stalled_future() {
        let interrupt = Interrupt::new();
        let stalled = interrupt.guard(async {
            std::future::pending::<()>().await;
            Ok(())
        });
        let trigger = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            interrupt.trigger();
        };
        let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(stalled, trigger)
        })
        .await
        .unwrap();
        assert!(matches!(result, Err(AurforgeError::Interrupted)));

        let finished = Interrupt::new().guard(async { Ok(7) }).await;
        assert_eq!(finished.unwrap(), 7);
    }
}
