//! cliclack theme

use cliclack::ThemeState;
use console::Style;

/// Green-accented theme for interactive output
#[derive(Debug, Clone, Default)]
pub struct JobCacheTheme;

impl cliclack::Theme for JobCacheTheme {
    fn bar_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().green(),
            ThemeState::Error(_) => Style::new().red(),
            ThemeState::Cancel => Style::new().dim(),
            ThemeState::Submit => Style::new().green().dim(),
        }
    }

    fn state_symbol_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Error(_) => Style::new().red(),
            ThemeState::Cancel => Style::new().yellow(),
            ThemeState::Active | ThemeState::Submit => Style::new().green(),
        }
    }
}

/// Install the theme for every later prompt and spinner
pub fn init_theme() {
    cliclack::set_theme(JobCacheTheme);
}
