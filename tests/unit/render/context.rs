use super::*;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct DeviceLog {
    events: Vec<String>,
    restored: Option<ContextSnapshot>,
}

struct FakeDevice {
    log: Arc<Mutex<DeviceLog>>,
    fail_initialize: bool,
    fail_swap: bool,
}

impl FakeDevice {
    fn new(log: Arc<Mutex<DeviceLog>>) -> Self {
        Self {
            log,
            fail_initialize: false,
            fail_swap: false,
        }
    }

    fn push(&self, event: impl Into<String>) {
        self.log.lock().unwrap().events.push(event.into());
    }
}

const HOST: ContextSnapshot = ContextSnapshot {
    display: 1,
    context: 2,
    draw_surface: 3,
    read_surface: 4,
};

impl RenderDevice for FakeDevice {
    fn current_snapshot(&self) -> ContextSnapshot {
        HOST
    }

    fn initialize(&mut self, surface: InputSurface, _attrs: &ContextAttributes) -> ExportResult<()> {
        if self.fail_initialize {
            return Err(ExportError::resource("no matching config"));
        }
        self.push(format!("initialize {}", surface.0));
        Ok(())
    }

    fn make_current(&mut self) -> ExportResult<()> {
        self.push("make_current");
        Ok(())
    }

    fn set_presentation_time(&mut self, pts_ns: i64) -> ExportResult<()> {
        self.push(format!("pts {pts_ns}"));
        Ok(())
    }

    fn swap_buffers(&mut self) -> ExportResult<()> {
        if self.fail_swap {
            return Err(ExportError::resource("surface lost"));
        }
        self.push("swap");
        Ok(())
    }

    fn destroy(&mut self) {
        self.push("destroy");
    }

    fn restore(&mut self, snapshot: &ContextSnapshot) {
        self.log.lock().unwrap().restored = Some(*snapshot);
    }
}

#[test]
fn default_attributes_request_recordable_rgba8() {
    let attrs = ContextAttributes::default();
    assert_eq!(
        (attrs.red_bits, attrs.green_bits, attrs.blue_bits, attrs.alpha_bits),
        (8, 8, 8, 8)
    );
    assert_eq!(attrs.depth_bits, 16);
    assert!(attrs.recordable);
    assert_eq!(attrs.client_version, 2);
}

#[test]
fn present_stamps_then_swaps() {
    let log = Arc::new(Mutex::new(DeviceLog::default()));
    let mut ctx = BoundContext::bind(
        Box::new(FakeDevice::new(log.clone())),
        InputSurface(7),
        &ContextAttributes::default(),
    )
    .unwrap();
    ctx.present(33_333_333).unwrap();
    drop(ctx);

    let log = log.lock().unwrap();
    assert_eq!(
        log.events,
        vec!["initialize 7", "make_current", "pts 33333333", "swap", "destroy"]
    );
    assert_eq!(log.restored, Some(HOST));
}

#[test]
fn failed_bind_still_restores_previous_context() {
    let log = Arc::new(Mutex::new(DeviceLog::default()));
    let mut device = FakeDevice::new(log.clone());
    device.fail_initialize = true;

    let err = BoundContext::bind(Box::new(device), InputSurface(1), &ContextAttributes::default())
        .err()
        .unwrap();
    assert!(matches!(err, ExportError::Resource(_)));

    let log = log.lock().unwrap();
    assert_eq!(log.events, vec!["destroy"]);
    assert_eq!(log.restored, Some(HOST));
}

#[test]
fn swap_failure_is_a_device_error() {
    let log = Arc::new(Mutex::new(DeviceLog::default()));
    let mut device = FakeDevice::new(log);
    device.fail_swap = true;
    let mut ctx =
        BoundContext::bind(Box::new(device), InputSurface(1), &ContextAttributes::default())
            .unwrap();
    let err = ctx.present(0).unwrap_err();
    assert!(matches!(err, ExportError::Device(_)));
    assert!(err.to_string().contains("surface lost"));
}
