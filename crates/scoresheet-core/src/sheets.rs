//! Match sheet entity and its payload in the current schema.
//!
//! JSON field names follow the persisted format of the mobile app, which is
//! why most fields carry a `serde(rename)`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Signatures are image data URLs.
pub const SIGNATURE_DATA_URL_PREFIX: &str = "data:image";

/// Upper bound on a signature data URL (roughly 400 KB of base64 image).
pub const SIGNATURE_DATA_URL_MAX_LENGTH: usize = 550_000;

/// One persisted scoresheet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchSheet {
    pub id: String,
    #[serde(with = "iso_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub updated_at: DateTime<Utc>,
    pub data: MatchData,
}

/// Full match payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchData {
    #[serde(default)]
    pub info: MatchInfo,
    #[serde(rename = "equipeA", default = "Team::blank_a")]
    pub team_a: Team,
    #[serde(rename = "equipeB", default = "Team::blank_b")]
    pub team_b: Team,
    #[serde(default)]
    pub scores: SetScores,
    #[serde(rename = "resultat", default)]
    pub result: MatchResult,
    #[serde(rename = "reclamations", default)]
    pub claims: String,
    #[serde(default)]
    pub signatures: Signatures,
}

impl Default for MatchData {
    /// Blank sheet: four empty player rows per team, no scores.
    fn default() -> Self {
        Self {
            info: MatchInfo::default(),
            team_a: Team::blank_a(),
            team_b: Team::blank_b(),
            scores: SetScores::default(),
            result: MatchResult::default(),
            claims: String::new(),
            signatures: Signatures::default(),
        }
    }
}

impl MatchData {
    /// Display title, `None` when neither team has a name yet.
    pub fn title(&self) -> Option<String> {
        if self.team_a.name.is_empty() && self.team_b.name.is_empty() {
            return None;
        }
        let a = non_empty_or(&self.team_a.name, "Équipe A");
        let b = non_empty_or(&self.team_b.name, "Équipe B");
        Some(format!("{a} vs {b}"))
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

/// Match metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MatchInfo {
    #[serde(rename = "championnat")]
    pub championship: String,
    /// ISO-8601 instant, empty when unknown.
    #[serde(rename = "dateTime")]
    pub date_time: String,
    #[serde(rename = "salle")]
    pub venue: String,
    #[serde(rename = "arbitreNom")]
    pub referee_name: String,
    #[serde(rename = "arbitreLicence")]
    pub referee_license: String,
    #[serde(rename = "arbitreClub")]
    pub referee_club: String,
    #[serde(rename = "autoArbitrage")]
    pub self_refereed: bool,
}

impl Default for MatchInfo {
    fn default() -> Self {
        Self {
            championship: String::new(),
            date_time: String::new(),
            venue: String::new(),
            referee_name: String::new(),
            referee_license: String::new(),
            referee_club: String::new(),
            self_refereed: true,
        }
    }
}

/// Side of the net.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TeamSide {
    A,
    B,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Team {
    pub id: TeamSide,
    #[serde(rename = "nom", default)]
    pub name: String,
    #[serde(rename = "joueurs", default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub coach: String,
    #[serde(rename = "capitaine", default)]
    pub captain: String,
}

impl Team {
    pub fn blank(side: TeamSide) -> Self {
        let prefix = match side {
            TeamSide::A => "p_a",
            TeamSide::B => "p_b",
        };
        Self {
            id: side,
            name: String::new(),
            players: (1..=4)
                .map(|n| Player::blank(format!("{prefix}_{n}")))
                .collect(),
            coach: String::new(),
            captain: String::new(),
        }
    }

    fn blank_a() -> Self {
        Self::blank(TeamSide::A)
    }

    fn blank_b() -> Self {
        Self::blank(TeamSide::B)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: String,
    #[serde(rename = "nom", default)]
    pub last_name: String,
    #[serde(rename = "prenom", default)]
    pub first_name: String,
    #[serde(rename = "numeroLicence", default)]
    pub license_number: String,
}

impl Player {
    pub fn blank(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            last_name: String::new(),
            first_name: String::new(),
            license_number: String::new(),
        }
    }
}

/// Points of each side in one set; `None` until entered.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetScore {
    pub a: Option<u32>,
    pub b: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SetScores {
    pub set1: SetScore,
    pub set2: SetScore,
    pub set3: SetScore,
    pub set4: SetScore,
    pub set5: SetScore,
}

impl SetScores {
    pub const SET_NAMES: [&'static str; 5] = ["set1", "set2", "set3", "set4", "set5"];

    pub fn as_array(&self) -> [SetScore; 5] {
        [self.set1, self.set2, self.set3, self.set4, self.set5]
    }

    pub fn from_array(sets: [SetScore; 5]) -> Self {
        let [set1, set2, set3, set4, set5] = sets;
        Self {
            set1,
            set2,
            set3,
            set4,
            set5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchResult {
    #[serde(rename = "vainqueur", default)]
    pub winner: Option<TeamSide>,
    #[serde(rename = "scoreSets", default)]
    pub set_score: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signatures {
    #[serde(rename = "capitaineA", default)]
    pub captain_a: Option<String>,
    #[serde(rename = "capitaineB", default)]
    pub captain_b: Option<String>,
    #[serde(rename = "arbitre", default)]
    pub referee: Option<String>,
}

impl Signatures {
    /// Copy keeping only signatures that look like image data URLs of sane size.
    pub fn validated(&self) -> Self {
        let keep = |s: &Option<String>| s.clone().filter(|v| is_valid_signature(v));
        Self {
            captain_a: keep(&self.captain_a),
            captain_b: keep(&self.captain_b),
            referee: keep(&self.referee),
        }
    }
}

pub fn is_valid_signature(data_url: &str) -> bool {
    data_url.starts_with(SIGNATURE_DATA_URL_PREFIX)
        && data_url.len() <= SIGNATURE_DATA_URL_MAX_LENGTH
}

/// Formats an instant the way the sheets are persisted (`2024-05-12T16:30:00.000Z`).
pub fn to_iso_millis(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde adapter writing millisecond ISO-8601 UTC strings and reading any RFC 3339 instant.
pub mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_iso_millis(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn blank_sheet_matches_mobile_defaults() {
        let data = MatchData::default();
        assert!(data.info.self_refereed);
        assert_eq!(data.team_a.id, TeamSide::A);
        assert_eq!(data.team_b.players.len(), 4);
        assert_eq!(data.team_a.players[0].id, "p_a_1");
        assert_eq!(data.team_b.players[3].id, "p_b_4");
        assert_eq!(data.scores.as_array(), [SetScore::default(); 5]);
    }

    #[test]
    fn serializes_with_persisted_field_names() {
        let value = serde_json::to_value(MatchData::default()).expect("serialize");
        assert_eq!(value["info"]["autoArbitrage"], json!(true));
        assert_eq!(value["equipeA"]["joueurs"][0]["numeroLicence"], json!(""));
        assert_eq!(value["scores"]["set5"], json!({ "a": null, "b": null }));
        assert_eq!(value["resultat"], json!({ "vainqueur": null, "scoreSets": "" }));
        assert_eq!(value["reclamations"], json!(""));
        assert_eq!(
            value["signatures"],
            json!({ "capitaineA": null, "capitaineB": null, "arbitre": null })
        );
    }

    #[test]
    fn sheet_timestamps_use_millisecond_iso_strings() {
        let at = Utc.with_ymd_and_hms(2024, 5, 12, 16, 30, 0).unwrap();
        let sheet = MatchSheet {
            id: "fm_1".into(),
            created_at: at,
            updated_at: at,
            data: MatchData::default(),
        };
        let value = serde_json::to_value(&sheet).expect("serialize");
        assert_eq!(value["createdAt"], json!("2024-05-12T16:30:00.000Z"));
        assert_eq!(value["updatedAt"], json!("2024-05-12T16:30:00.000Z"));

        let back: MatchSheet = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, sheet);
    }

    #[test]
    fn title_falls_back_per_team() {
        let mut data = MatchData::default();
        assert_eq!(data.title(), None);

        data.team_a.name = "Les Smasheurs".into();
        assert_eq!(data.title().as_deref(), Some("Les Smasheurs vs Équipe B"));

        data.team_b.name = "Block Party".into();
        assert_eq!(
            data.title().as_deref(),
            Some("Les Smasheurs vs Block Party")
        );
    }

    #[test]
    fn validated_signatures_drop_non_images_and_oversized() {
        let signatures = Signatures {
            captain_a: Some("data:image/png;base64,AAAA".into()),
            captain_b: Some("javascript:alert(1)".into()),
            referee: Some(format!(
                "data:image/png;base64,{}",
                "A".repeat(SIGNATURE_DATA_URL_MAX_LENGTH)
            )),
        };
        let validated = signatures.validated();
        assert_eq!(
            validated.captain_a.as_deref(),
            Some("data:image/png;base64,AAAA")
        );
        assert_eq!(validated.captain_b, None);
        assert_eq!(validated.referee, None);
    }
}
