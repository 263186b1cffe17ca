//! Tool execution. The dispatcher maps a resolved tool call to a spoken
//! Russian response; it never returns an error to the caller. Failures
//! degrade to fixed apology phrases and the details go to the log.

pub mod weather;

pub use weather::{WeatherClient, WeatherReport};

use crate::parser::args::{DurationArgs, ToolArgs};
use crate::parser::Tool;
use crate::scheduler::{EventKind, SchedulerEngine};
use chrono::{Local, Timelike, Utc};
use std::sync::Arc;
use tracing::warn;

const TIMER_ACK: &str = "Поставил таймер";
const NOTIFICATION_ACK: &str = "Поставил напоминание";
const TIMER_APOLOGY: &str = "Не удалось установить таймер";
const NOTIFICATION_APOLOGY: &str = "Не удалось установить напоминание";
const WEATHER_APOLOGY: &str = "Сервис погоды временно недоступен";
const CALL_APOLOGY: &str = "Не удалось выполнить звонок";

pub struct ToolDispatcher {
    scheduler: Arc<SchedulerEngine>,
    weather: Option<WeatherClient>,
}

impl ToolDispatcher {
    pub fn new(scheduler: Arc<SchedulerEngine>, weather: Option<WeatherClient>) -> Self {
        Self { scheduler, weather }
    }

    /// Execute a tool and produce the spoken response. Infallible: internal
    /// errors are logged and replaced with an apology phrase.
    pub async fn dispatch(&self, tool: Tool, args: &ToolArgs) -> String {
        match tool {
            Tool::GetTime => Self::current_time(),
            Tool::GetWeather => self.fetch_weather().await,
            Tool::SetTimer => self.set_timer(args).await,
            Tool::SetNotification => self.set_notification(args).await,
            Tool::CallContact => self.call_contact(args).await,
        }
    }

    fn current_time() -> String {
        let now = Local::now();
        format!("Текущее время {} часов, {} минут", now.hour(), now.minute())
    }

    async fn fetch_weather(&self) -> String {
        let Some(client) = &self.weather else {
            return WEATHER_APOLOGY.to_string();
        };
        match client.current().await {
            Ok(report) => format!(
                "Текущая погода для региона {}: температура {} градусов по цельсию, \
                 скорость ветра {} километров в час",
                report.region, report.temperature_c, report.wind_kph
            ),
            Err(e) => {
                warn!("weather fetch failed: {e:#}");
                WEATHER_APOLOGY.to_string()
            }
        }
    }

    async fn set_timer(&self, args: &ToolArgs) -> String {
        let duration = match args {
            ToolArgs::Timer(d) => *d,
            _ => DurationArgs::minutes(1),
        };
        let due = Utc::now() + duration.to_duration();
        match self.scheduler.schedule(EventKind::Timer, due, None).await {
            Ok(_) => TIMER_ACK.to_string(),
            Err(e) => {
                warn!("timer scheduling failed: {e:#}");
                TIMER_APOLOGY.to_string()
            }
        }
    }

    async fn set_notification(&self, args: &ToolArgs) -> String {
        let (duration, text) = match args {
            ToolArgs::Notification { duration, text } => (*duration, text.clone()),
            _ => (DurationArgs::minutes(5), "Напоминание".to_string()),
        };
        let due = Utc::now() + duration.to_duration();
        match self
            .scheduler
            .schedule(EventKind::Notification, due, Some(text))
            .await
        {
            Ok(_) => NOTIFICATION_ACK.to_string(),
            Err(e) => {
                warn!("notification scheduling failed: {e:#}");
                NOTIFICATION_APOLOGY.to_string()
            }
        }
    }

    async fn call_contact(&self, args: &ToolArgs) -> String {
        let name = match args {
            ToolArgs::Contact { name } => name.as_str(),
            _ => "неизвестный контакт",
        };
        match self.scheduler.store().find_contact(name).await {
            Ok(Some(contact)) => {
                let spaced = spell_out_number(&contact.phone_number);
                format!("Контакт {} найден, звоню {}", contact.name, spaced)
            }
            Ok(None) => format!("Контакт {name} не найден"),
            Err(e) => {
                warn!("contact lookup failed: {e:#}");
                CALL_APOLOGY.to_string()
            }
        }
    }
}

/// Space-separate every digit so the TTS reads the number digit by digit.
fn spell_out_number(number: &str) -> String {
    number
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
