use cef::{rc::*, *};

use crate::host::DynPumpHost;

wrap_browser_process_handler! {
    pub struct ChromiumBrowserProcessHandler {
        host: DynPumpHost,
    }

    impl BrowserProcessHandler {
        fn on_schedule_message_pump_work(&self, delay_ms: i64) {
            // Called on any thread.
            self.host.on_schedule_message_pump_work(delay_ms);
        }
    }
}
