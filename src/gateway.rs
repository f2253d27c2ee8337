//! The `Gateway` facade (§4.6): wires [`crate::transp::Transp`] and
//! [`crate::ser::Ser`], owns the optional worker thread, and exposes the
//! lifecycle/setters the original's `ser2mms_new`/`ser2mms_run`/
//! `ser2mms_destroy`/`ser2mms_set_cmd`/`ser2mms_set_id`/`ser2mms_test_tick`
//! expose as C entry points.
//!
//! Construction order follows §3's lifecycle invariant: codecs, then
//! events, then `Ser`, then `Transp`; entities are destroyed in reverse by
//! ordinary `Drop`, and a failed construction step rolls back everything
//! allocated so far by simply not returning a `Gateway` (the partially
//! built pieces are local values that drop themselves).

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::info;

use crate::config::GatewayConfig;
use crate::crc16::CrcVariant;
use crate::error::GatewayError;
use crate::port::{Gpio, NullGpio, Serial2Link, SerialLink, StdThread, Thread};
use crate::ser::{PayloadApi, Ser, SubsMode};
use crate::transp::Transp;
use crate::types::Role;

/// Default RX/TX buffer capacity: the largest possible frame (SLAVE-in,
/// full subscriptions) comfortably fits with headroom. §6.1 puts the
/// default full-mode SLAVE-in size at 100 bytes.
const DEFAULT_BUF_CAPACITY: usize = 256;

/// A thin, stateful facade over the protocol engine. Generic over the user's
/// [`PayloadApi`] implementation. `inner` is shared (`Arc<Mutex<_>>`) rather
/// than moved into the worker thread on `run()`, so `set_cmd`/`set_id`/
/// `test_tick`/`user_context` stay live and non-panicking for the Gateway's
/// whole life, threaded or not — the worker thread and these accessors just
/// contend for the same lock `poll()` already takes each iteration.
pub struct Gateway<U: PayloadApi + Send + 'static> {
    role: Role,
    threaded: bool,
    running: Arc<AtomicBool>,
    worker: Option<Box<dyn Thread>>,
    inner: Arc<Mutex<GatewayInner<U>>>,
}

/// The parts of the Gateway a `poll()` call touches together. Grouped so a
/// single lock covers `transp`/`ser`/`user` as one unit, matching the
/// at-most-one-frame-in-flight invariant (§3) those three already share.
struct GatewayInner<U: PayloadApi> {
    transp: Transp,
    ser: Ser,
    user: U,
}

/// A locked view of the user-supplied [`PayloadApi`] implementation, handed
/// out by [`Gateway::user_context`]/[`Gateway::user_context_mut`]. Holds the
/// same lock the worker thread polls under, so in threaded mode a call
/// blocks only as long as the worker is mid-`poll()`, rather than racing a
/// moved-out value.
pub struct UserContextGuard<'a, U: PayloadApi> {
    guard: MutexGuard<'a, GatewayInner<U>>,
}

impl<'a, U: PayloadApi> Deref for UserContextGuard<'a, U> {
    type Target = U;

    fn deref(&self) -> &U {
        &self.guard.user
    }
}

impl<'a, U: PayloadApi> DerefMut for UserContextGuard<'a, U> {
    fn deref_mut(&mut self) -> &mut U {
        &mut self.guard.user
    }
}

impl<U: PayloadApi + Send + 'static> Gateway<U> {
    /// Constructs codecs, events, `Ser`, and `Transp` in that order (§3).
    /// Opening the serial link or GPIO can fail; on failure nothing is
    /// returned and every value constructed so far is simply dropped.
    pub fn new(user: U, config: &GatewayConfig) -> Result<Self, GatewayError> {
        let link: Box<dyn SerialLink> =
            Box::new(Serial2Link::open(&config.port.device, config.port.baud_rate).map_err(GatewayError::PortOpen)?);

        let gpio: Box<dyn Gpio> = match (&config.port.gpio_path, config.port.gpio_pin) {
            (Some(path), Some(pin)) => {
                Box::new(crate::port::SysfsGpio::open(path, pin).map_err(GatewayError::GpioInit)?)
            }
            _ => Box::new(NullGpio),
        };

        let ser = Ser::new(config.role, config.subs_mode);
        let expected_size = ser.expected_frame_size();
        let mut transp = Transp::new(
            config.id,
            config.crc,
            config.threaded,
            link,
            gpio,
            DEFAULT_BUF_CAPACITY,
            expected_size,
        );
        transp.start();

        info!(
            "gateway constructed: role={:?} id={} crc={:?} subs={:?} threaded={}",
            config.role, config.id, config.crc, config.subs_mode, config.threaded
        );

        Ok(Gateway {
            role: config.role,
            threaded: config.threaded,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            inner: Arc::new(Mutex::new(GatewayInner { transp, ser, user })),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn lock_inner(&self) -> MutexGuard<'_, GatewayInner<U>> {
        self.inner.lock().expect("gateway inner mutex poisoned")
    }

    /// The opaque user-context accessor (`ser2mms_get_ied` in the original).
    /// Safe to call at any point in the Gateway's life, threaded or not —
    /// see [`UserContextGuard`].
    pub fn user_context(&self) -> UserContextGuard<'_, U> {
        UserContextGuard { guard: self.lock_inner() }
    }

    pub fn user_context_mut(&self) -> UserContextGuard<'_, U> {
        UserContextGuard { guard: self.lock_inner() }
    }

    /// POLL only: sets the command word used for the next transmit
    /// (`ser2mms_set_cmd`). Accepted but meaningless in the SLAVE role.
    pub fn set_cmd(&self, cmd: crate::types::Cmd) {
        self.lock_inner().ser.set_cmd(cmd);
    }

    /// Updates this endpoint's bus address (`ser2mms_set_id`).
    pub fn set_id(&self, id: u8) {
        self.lock_inner().transp.set_id(id);
    }

    /// In single-threaded mode, the host's cooperative entry point — call
    /// this from a tight loop (§4.5.4, P7: idempotent when there's no
    /// work). In threaded mode this does nothing; the worker thread already
    /// drives `poll()`.
    pub fn poll(&self) {
        if self.threaded {
            return;
        }
        let mut inner = self.lock_inner();
        inner.transp.poll(&mut inner.ser, &mut inner.user);
    }

    /// Manual schedule-advance entry point (`ser2mms_test_tick`, the
    /// `SIGQUIT` hook in the original poll sample). POLL only; builds and
    /// queues the next request if none is outstanding.
    pub fn test_tick(&self) {
        let mut inner = self.lock_inner();
        if inner.ser.role() == Role::Poll {
            inner.transp.poll_tick(&mut inner.ser, &mut inner.user);
        }
    }

    /// Starts the worker loop. In threaded mode this spawns a thread that
    /// calls `poll()` (and, for POLL, checks an internal tick timer) until
    /// `running` is cleared; in single-threaded mode this only marks the
    /// engine as running and the host must call [`Gateway::poll`] itself.
    ///
    /// The worker only ever borrows `inner` through the shared `Arc<Mutex<_>>`
    /// — it is never moved out of the Gateway — so `set_cmd`/`set_id`/
    /// `test_tick`/`user_context` remain usable from the calling thread for
    /// as long as the Gateway lives, not just until `run()` is called.
    pub fn run(&mut self) -> Result<(), GatewayError>
    where
        U: 'static,
    {
        self.running.store(true, Ordering::SeqCst);
        if !self.threaded {
            return Ok(());
        }

        let inner = self.inner.clone();
        let running = self.running.clone();
        let role = self.role;

        let handle = StdThread::spawn("ser2mms-worker", move || {
            let tick_interval = Duration::from_millis(500);
            let mut next_tick = std::time::Instant::now() + tick_interval;
            while running.load(Ordering::SeqCst) {
                {
                    let mut inner = inner.lock().expect("gateway inner mutex poisoned");
                    inner.transp.poll(&mut inner.ser, &mut inner.user);
                    if role == Role::Poll && std::time::Instant::now() >= next_tick {
                        inner.transp.poll_tick(&mut inner.ser, &mut inner.user);
                        next_tick = std::time::Instant::now() + tick_interval;
                    }
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        })
        .map_err(GatewayError::ThreadSpawn)?;

        self.worker = Some(Box::new(handle));
        Ok(())
    }

    /// Joins the worker (threaded) and tears down the transport. After this
    /// call the Gateway is inert; a fresh one should be built via `new`.
    pub fn destroy(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("worker thread panicked during shutdown");
            }
        }
        info!("gateway destroyed");
    }
}

impl<U: PayloadApi + Send + 'static> Drop for Gateway<U> {
    fn drop(&mut self) {
        self.destroy();
    }
}
