//! User-facing texts in every supported language.
//!
//! Lookups never fail: an unset language and any text missing from a
//! translation fall back to English.

use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Uz,
    Ru,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::En, Language::Uz, Language::Ru];

    /// Label shown on the language selection button.
    pub fn button_label(self) -> &'static str {
        match self {
            Language::En => "🇺🇸 English",
            Language::Uz => "🇺🇿 O'zbek",
            Language::Ru => "🇷🇺 Русский",
        }
    }
}

/// Keys of every text the bot sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Text {
    Welcome,
    Registered,
    Instruction,
    Processing,
    /// `{input}`
    NoItems,
    /// `{count}`
    Downloading,
    FetchError,
    /// `{input}`
    StoryFrom,
    /// `{relayed}`, `{total}`
    Partial,
    SystemError,
    /// `{seconds}`
    Cooldown,
    /// `{count}`, `{limit}`
    DailyLimit,
    InFlight,
}

fn english(key: Text) -> &'static str {
    match key {
        Text::Welcome => "🇺🇸 Welcome! Please choose your language:",
        Text::Registered => "Language set to English 🇺🇸",
        Text::Instruction => "**You can send:**\n- `username` or `@username`\n- `+1234567890`",
        Text::Processing => "⏳ Processing...",
        Text::NoItems => "No stories found for {input}.",
        Text::Downloading => "⬇️ Found {count} stories, downloading...",
        Text::FetchError => "⚠️ Could not fetch stories right now. Please try again later.",
        Text::StoryFrom => "Story from {input}",
        Text::Partial => "⚠️ Delivered {relayed} of {total} stories. The rest could not be delivered.",
        Text::SystemError => "An error occurred. Please try again.",
        Text::Cooldown => "🚫 Please wait {seconds} seconds between downloads.",
        Text::DailyLimit => {
            "🚫 Daily limit reached ({count}/{limit}). Upgrade to Premium for unlimited downloads!"
        }
        Text::InFlight => "⏳ Your previous request is still being processed.",
    }
}

fn uzbek(key: Text) -> Option<&'static str> {
    Some(match key {
        Text::Welcome => "🇺🇿 Xush kelibsiz! Tilni tanlang:",
        Text::Registered => "O'zbek tili tanlandi 🇺🇿",
        Text::Instruction => {
            "**Yuborishingiz mumkin:**\n- `username` yoki `@username`\n- `+998901234567`"
        }
        Text::Processing => "⏳ Qidirilmoqda...",
        Text::NoItems => "{input} uchun storislar topilmadi.",
        Text::Downloading => "⬇️ {count} ta storis topildi, yuklanmoqda...",
        Text::FetchError => "⚠️ Hozircha storislarni olib bo'lmadi. Keyinroq urinib ko'ring.",
        Text::StoryFrom => "{input} storisi",
        Text::Partial => "⚠️ {total} tadan {relayed} ta storis yuborildi. Qolganlarini yetkazib bo'lmadi.",
        Text::SystemError => "Xatolik yuz berdi. Qaytadan urinib ko'ring.",
        Text::Cooldown => "🚫 Yuklashlar orasida {seconds} soniya kuting.",
        Text::DailyLimit => {
            "🚫 Limit tugadi ({count}/{limit}). Cheksiz yuklash uchun Premium oling!"
        }
        Text::InFlight => "⏳ Oldingi so'rovingiz hali bajarilmoqda.",
    })
}

fn russian(key: Text) -> Option<&'static str> {
    Some(match key {
        Text::Welcome => "🇷🇺 Добро пожаловать! Выберите язык:",
        Text::Registered => "Язык выбран: Русский 🇷🇺",
        Text::Instruction => {
            "**Вы можете отправить:**\n- `username` или `@username`\n- `+79001234567`"
        }
        Text::Processing => "⏳ Обработка...",
        Text::NoItems => "Истории для {input} не найдены.",
        Text::Downloading => "⬇️ Найдено историй: {count}, загружаем...",
        Text::FetchError => "⚠️ Не удалось получить истории. Попробуйте позже.",
        Text::StoryFrom => "История от {input}",
        Text::Partial => "⚠️ Отправлено {relayed} из {total} историй. Остальные доставить не удалось.",
        Text::SystemError => "Произошла ошибка. Попробуйте ещё раз.",
        Text::Cooldown => "🚫 Подождите {seconds} секунд между загрузками.",
        Text::DailyLimit => {
            "🚫 Лимит исчерпан ({count}/{limit}). Купите Premium для безлимитных загрузок!"
        }
        Text::InFlight => "⏳ Ваш предыдущий запрос ещё обрабатывается.",
    })
}

/// Look up `key` in `language`, falling back to English.
pub fn text(language: Option<Language>, key: Text) -> &'static str {
    let translated = match language {
        Some(Language::Uz) => uzbek(key),
        Some(Language::Ru) => russian(key),
        Some(Language::En) | None => None,
    };
    translated.unwrap_or_else(|| english(key))
}

/// Look up `key` and substitute `{name}` placeholders.
pub fn render(language: Option<Language>, key: Text, args: &[(&str, &dyn std::fmt::Display)]) -> String {
    let mut out = text(language, key).to_owned();
    for (name, value) in args {
        out = out.replace(&format!("{{{name}}}"), &value.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn unset_language_falls_back_to_english() {
        assert_eq!(text(None, Text::Processing), "⏳ Processing...");
        assert_eq!(text(Some(Language::Ru), Text::Processing), "⏳ Обработка...");
    }

    #[test]
    fn render_substitutes_every_placeholder() {
        let msg = render(Some(Language::En), Text::Partial, &[("relayed", &2), ("total", &5)]);
        assert_eq!(msg, "⚠️ Delivered 2 of 5 stories. The rest could not be delivered.");
        for lang in Language::ALL {
            let msg = render(Some(lang), Text::DailyLimit, &[("count", &3), ("limit", &3)]);
            assert!(msg.contains("(3/3)"), "{lang}: {msg}");
            assert!(!msg.contains('{'), "{lang}: {msg}");
        }
    }

    #[test]
    fn language_codes_round_trip_through_strings() {
        assert_eq!(Language::from_str("uz").unwrap(), Language::Uz);
        assert_eq!(Language::from_str("RU").unwrap(), Language::Ru);
        assert_eq!(Language::En.to_string(), "en");
        assert!(Language::from_str("de").is_err());
    }
}
