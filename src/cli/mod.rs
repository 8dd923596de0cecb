pub mod netlogd;

pub fn log_level_from_verbosity_flag_count(num: u8) -> log::LevelFilter {
    match num {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        2..=u8::MAX => log::LevelFilter::Trace,
    }
}
