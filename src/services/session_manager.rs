use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::models::session::{AdminUser, Claims, LoginOutcome, SessionEvent, SessionState};
use crate::services::auth_transport::AuthTransport;
use crate::services::clock::Clock;
use crate::services::token::decode_claims;

pub const DEFAULT_REFRESH_LEAD_SECS: i64 = 60;

/// Time to wait before refreshing: `lead` ahead of expiry, never negative.
pub fn refresh_delay(claims: &Claims, now: DateTime<Utc>, lead: ChronoDuration) -> Duration {
    let remaining_ms = claims
        .exp
        .saturating_mul(1000)
        .saturating_sub(now.timestamp_millis());
    let delay_ms = remaining_ms.saturating_sub(lead.num_milliseconds()).max(0);
    Duration::from_millis(delay_ms as u64)
}

#[derive(Default)]
struct SessionSlot {
    token: Option<String>,
    pending_second_factor: Option<String>,
    // Bumped on every install and clear; stale refresh results are dropped
    generation: u64,
    refreshing: bool,
    refresh_timer: Option<JoinHandle<()>>,
}

impl SessionSlot {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.refresh_timer.take() {
            timer.abort();
        }
    }
}

struct SessionInner {
    transport: Arc<dyn AuthTransport>,
    clock: Arc<dyn Clock>,
    refresh_lead: ChronoDuration,
    slot: Mutex<SessionSlot>,
    events: broadcast::Sender<SessionEvent>,
    refresh_requests: mpsc::UnboundedSender<u64>,
}

/// Clears the refreshing flag when a refresh ends without replacing the slot,
/// including when the caller drops the future mid-flight.
struct RefreshingGuard<'a> {
    inner: &'a SessionInner,
    generation: u64,
}

impl Drop for RefreshingGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.inner.slot.lock();
        if slot.generation == self.generation {
            slot.refreshing = false;
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.slot.get_mut().cancel_timer();
    }
}

/// Owns the admin bearer token for the lifetime of the application and keeps
/// it fresh. Cloning yields another handle to the same session.
///
/// Must be created inside a Tokio runtime: the refresh worker is spawned on
/// construction.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn AuthTransport>,
        clock: Arc<dyn Clock>,
        refresh_lead: ChronoDuration,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        let (refresh_requests, receiver) = mpsc::unbounded_channel();

        let inner = Arc::new(SessionInner {
            transport,
            clock,
            refresh_lead,
            slot: Mutex::new(SessionSlot::default()),
            events,
            refresh_requests,
        });

        tokio::spawn(run_refresh_worker(Arc::downgrade(&inner), receiver));

        Self { inner }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, SessionError> {
        let response = self.inner.transport.login(email, password).await?;

        let user = response.user.clone().or_else(|| {
            decode_claims(&response.token)
                .ok()
                .map(|claims| AdminUser::from(&claims))
        });

        if response.requires_2fa {
            info!("Login for {} requires a second factor", email);
            let mut slot = self.inner.slot.lock();
            slot.pending_second_factor = Some(response.token.clone());
        } else {
            self.install_token(&response.token, None)?;
            info!("Admin {} logged in", email);
        }

        Ok(LoginOutcome {
            token: response.token,
            user,
            requires_2fa: response.requires_2fa,
        })
    }

    pub async fn verify_second_factor(&self, code: &str) -> Result<Claims, SessionError> {
        let pending = self.pending_second_factor()?;
        let response = self.inner.transport.verify_two_factor(&pending, code).await?;
        self.install_token(&response.token, None)
    }

    pub async fn verify_backup_code(&self, code: &str) -> Result<Claims, SessionError> {
        let pending = self.pending_second_factor()?;
        let response = self.inner.transport.verify_backup_code(&pending, code).await?;
        self.install_token(&response.token, None)
    }

    fn pending_second_factor(&self) -> Result<String, SessionError> {
        self.inner
            .slot
            .lock()
            .pending_second_factor
            .clone()
            .ok_or(SessionError::NoSession)
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), SessionError> {
        self.inner.transport.reset_admin_password(email).await
    }

    /// Invalidates the remote session, then clears local state whatever the
    /// remote answered.
    pub async fn logout(&self) {
        let token = self.inner.slot.lock().token.clone();

        if let Some(token) = token {
            if let Err(e) = self.inner.transport.logout(&token).await {
                warn!("Remote logout failed, clearing local session anyway: {}", e);
            }
        }

        self.clear();
        let _ = self.inner.events.send(SessionEvent::LoggedOut);
        info!("Admin session closed");
    }

    /// Exchanges the current token for a new one.
    ///
    /// Any failure leaves the manager anonymous and emits
    /// [`SessionEvent::Expired`] before the error is returned. A result that
    /// arrives after the session was replaced or closed is discarded with
    /// [`SessionError::Superseded`].
    pub async fn refresh_token(&self) -> Result<String, SessionError> {
        let (current, generation) = {
            let mut slot = self.inner.slot.lock();
            let Some(token) = slot.token.clone() else {
                if slot.pending_second_factor.is_some() {
                    return Err(SessionError::SecondFactorRequired);
                }
                return Err(SessionError::NoSession);
            };
            slot.refreshing = true;
            (token, slot.generation)
        };
        let _refreshing = RefreshingGuard {
            inner: &self.inner,
            generation,
        };

        debug!("Refreshing admin token (generation {})", generation);

        let installed = match self.inner.transport.refresh_admin_token(&current).await {
            Ok(response) => self
                .install_token(&response.token, Some(generation))
                .map(|_| response.token),
            Err(e) => Err(e),
        };

        match installed {
            Ok(token) => {
                let _ = self.inner.events.send(SessionEvent::Refreshed);
                info!("Admin token refreshed");
                Ok(token)
            }
            Err(SessionError::Superseded) => {
                debug!("Discarding refresh result for stale generation {}", generation);
                Err(SessionError::Superseded)
            }
            Err(e) => {
                if self.clear_if_current(generation) {
                    warn!("Token refresh failed, session expired: {}", e);
                    let _ = self.inner.events.send(SessionEvent::Expired {
                        reason: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    /// Installs a token obtained elsewhere, e.g. one persisted by a previous run.
    pub fn restore(&self, token: &str) -> Result<Claims, SessionError> {
        self.install_token(token, None)
    }

    pub fn is_authenticated(&self) -> bool {
        let now = self.inner.clock.now();
        self.get_user()
            .map(|claims| !claims.is_expired_at(now))
            .unwrap_or(false)
    }

    /// Claims of the held token, expired or not. `None` if absent or undecodable.
    pub fn get_user(&self) -> Option<Claims> {
        let token = self.inner.slot.lock().token.clone()?;
        decode_claims(&token).ok()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.slot.lock().token.clone()
    }

    pub fn state(&self) -> SessionState {
        let slot = self.inner.slot.lock();
        match (&slot.token, slot.refreshing) {
            (Some(_), true) => SessionState::Refreshing,
            (Some(_), false) => SessionState::Authenticated,
            (None, _) => SessionState::Anonymous,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    fn current_generation(&self) -> u64 {
        self.inner.slot.lock().generation
    }

    /// Replaces the held token and its refresh timer. With `expected`, the
    /// swap only happens if no other install or clear happened since.
    fn install_token(&self, token: &str, expected: Option<u64>) -> Result<Claims, SessionError> {
        let claims = decode_claims(token)?;
        let delay = refresh_delay(&claims, self.inner.clock.now(), self.inner.refresh_lead);

        let mut slot = self.inner.slot.lock();
        if expected.is_some_and(|generation| generation != slot.generation) {
            return Err(SessionError::Superseded);
        }

        slot.cancel_timer();
        slot.generation += 1;
        slot.token = Some(token.to_string());
        slot.pending_second_factor = None;
        slot.refreshing = false;
        slot.refresh_timer = Some(spawn_refresh_timer(
            self.inner.refresh_requests.clone(),
            slot.generation,
            delay,
        ));

        info!(
            "Token installed for {} (expires {}), refresh in {:?}",
            claims.email,
            claims.expires_at(),
            delay
        );
        Ok(claims)
    }

    fn clear(&self) {
        let mut slot = self.inner.slot.lock();
        slot.cancel_timer();
        slot.generation += 1;
        slot.token = None;
        slot.pending_second_factor = None;
        slot.refreshing = false;
    }

    fn clear_if_current(&self, generation: u64) -> bool {
        let mut slot = self.inner.slot.lock();
        if slot.generation != generation {
            return false;
        }
        slot.cancel_timer();
        slot.generation += 1;
        slot.token = None;
        slot.refreshing = false;
        true
    }
}

fn spawn_refresh_timer(
    requests: mpsc::UnboundedSender<u64>,
    generation: u64,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = requests.send(generation);
    })
}

async fn run_refresh_worker(session: Weak<SessionInner>, mut requests: mpsc::UnboundedReceiver<u64>) {
    while let Some(generation) = requests.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        let manager = SessionManager { inner };

        if manager.current_generation() != generation {
            debug!("Skipping refresh for replaced token (generation {})", generation);
            continue;
        }
        // The timer that sent this request has finished
        manager.inner.slot.lock().refresh_timer = None;

        if let Err(e) = manager.refresh_token().await {
            warn!("Scheduled token refresh failed: {}", e);
        }
    }
    debug!("Refresh worker stopped");
}
