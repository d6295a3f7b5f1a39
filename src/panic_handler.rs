use std::panic;

use log::error;

/// Install `better_panic` and make sure panics also reach the log file.
///
/// Backend panics pass through here too before the lane boundary catches
/// them, so they show up in the log with their location.
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let thread = std::thread::current();
        let name = thread.name().unwrap_or("<unnamed>");
        match panic_info.location() {
            Some(location) => error!(
                "Thread '{name}' panicked at {}:{}: {}",
                location.file(),
                location.line(),
                payload_text(panic_info.payload())
            ),
            None => error!(
                "Thread '{name}' panicked: {}",
                payload_text(panic_info.payload())
            ),
        }
        log::logger().flush();

        default_hook(panic_info);
    }));
}

fn payload_text(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "Box<dyn Any>"
    }
}
