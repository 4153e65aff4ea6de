use std::io::Write;

/// 日志级别的环境变量，例如 `TRUVIS_LOG=debug`
const LOG_LEVEL_ENV: &str = "TRUVIS_LOG";

fn level_filter() -> log::LevelFilter {
    std::env::var(LOG_LEVEL_ENV).ok().and_then(|level| level.parse().ok()).unwrap_or(log::LevelFilter::Info)
}

fn builder() -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let info_style = buf
                .default_level_style(log::Level::Info)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
            let warn_style = buf
                .default_level_style(log::Level::Warn)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
            let error_style = buf
                .default_level_style(log::Level::Error)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

            let level_style = match record.level() {
                log::Level::Info => info_style,
                log::Level::Warn => warn_style,
                log::Level::Error => error_style,
                _ => buf.default_level_style(record.level()),
            };
            let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));
            let black_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(75, 75, 75))));

            let line = record.line().unwrap_or(!0);
            let file = record.file().unwrap_or("").split(['\\', '/']).next_back().unwrap_or("");
            let time = chrono::Local::now().format("%H:%M:%S");
            let level = record.level();

            writeln!(
                buf,
                "{level_style}[{time}] {level}{level_style:#} {grey_style}[{file}:{line}]{grey_style:#} \
                 {black_style}{}{black_style:#}",
                record.args()
            )
        })
        .filter(None, level_filter());
    builder
}

/// 应用入口调用一次，重复调用会 panic
pub fn init_log() {
    builder().init();
}

/// 测试用：输出交给 test harness 捕获，可以被多个测试重复调用
pub fn init_test_log() {
    let _ = builder().is_test(true).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_log_is_repeatable() {
        init_test_log();
        init_test_log();
        log::info!("logger installed");
    }
}
