mod browser_process_handler;

use cef::{rc::*, *};

use crate::{chromium::config::CMD_SWITCHES, host::DynPumpHost};
pub use browser_process_handler::ChromiumBrowserProcessHandler;

/// The browser process gets no `--type` switch.
fn is_browser_process(process_type: Option<&CefString>) -> bool {
    process_type.is_none_or(|process_type| process_type.to_string().is_empty())
}

wrap_app! {
    pub struct ChromiumApp {
        host: DynPumpHost,
    }

    impl App {
        fn on_before_command_line_processing(
            &self,
            process_type: Option<&CefString>,
            command_line: Option<&mut CommandLine>,
        ) {
            if is_browser_process(process_type)
                && let Some(line) = command_line
            {
                CMD_SWITCHES.iter().for_each(|switch| {
                    line.append_switch(Some(&CefString::from(switch.to_owned())));
                });
            }
        }

        fn browser_process_handler(&self) -> Option<BrowserProcessHandler> {
            Some(ChromiumBrowserProcessHandler::new(self.host.clone()))
        }
    }
}
