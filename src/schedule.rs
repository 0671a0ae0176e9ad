use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};

use std::fmt;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly(Weekday),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub frequency: Frequency,
    pub at: NaiveTime,
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.frequency {
            Frequency::Daily => write!(f, "daily at {}", self.at.format("%H:%M")),
            Frequency::Weekly(day) => write!(f, "every {} at {}", day, self.at.format("%H:%M")),
        }
    }
}

/// Longest single sleep in `wait_until`; the clock is re-read after each one.
const MAX_SLEEP: std::time::Duration = std::time::Duration::from_secs(60);

fn default_time() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default()
}

impl Schedule {
    pub fn from_config(config: &Config) -> Self {
        Self::parse(
            &config.newsletter_frequency,
            &config.newsletter_send_day,
            &config.newsletter_send_time,
        )
    }

    /// Builds a schedule from the raw settings, falling back to Monday 08:00
    /// for anything that does not parse.
    pub fn parse(frequency: &str, day: &str, time: &str) -> Self {
        let at = NaiveTime::parse_from_str(time.trim(), "%H:%M").unwrap_or_else(|_| {
            tracing::warn!("Invalid send time {:?}, using 08:00", time);
            default_time()
        });

        let frequency = match frequency.trim().to_lowercase().as_str() {
            "daily" => Frequency::Daily,
            other => {
                if other != "weekly" {
                    tracing::warn!("Unknown frequency {:?}, using weekly", other);
                }
                let day = day.trim().parse::<Weekday>().unwrap_or_else(|_| {
                    tracing::warn!("Invalid send day {:?}, using monday", day);
                    Weekday::Mon
                });
                Frequency::Weekly(day)
            }
        };

        Self { frequency, at }
    }

    /// The first scheduled moment strictly after `now`, in `now`'s timezone.
    pub fn next_run<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = now.timezone();
        let today = now.date_naive();

        // Eight days covers a weekly slot that already passed today.
        for offset in 0..=8 {
            let date = today + Duration::days(offset);
            if let Frequency::Weekly(day) = self.frequency {
                if date.weekday() != day {
                    continue;
                }
            }
            // Skips local times that fall in a DST gap.
            let Some(candidate) = tz.from_local_datetime(&date.and_time(self.at)).earliest() else {
                continue;
            };
            if candidate > *now {
                return candidate;
            }
        }

        now.clone() + Duration::days(1)
    }
}

/// Sleeps until the wall clock reaches `at`. Returns at once when `at` has passed.
pub async fn wait_until<Tz: TimeZone>(at: &DateTime<Tz>) {
    let at = at.with_timezone(&Utc);
    loop {
        let Ok(remaining) = (at - Utc::now()).to_std() else {
            return;
        };
        if remaining.is_zero() {
            return;
        }
        tokio::time::sleep(remaining.min(MAX_SLEEP)).await;
    }
}
