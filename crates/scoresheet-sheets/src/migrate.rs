//! Upgrades stored match payloads of any earlier shape to the current `MatchData`.
//!
//! Older app versions stored the match date as separate `date` (`DD/MM/YYYY`)
//! and `heure` (`18h30` or `18:30`) fields, omitted the referee/venue metadata
//! and could leave whole sets undefined. Migration is idempotent: a payload
//! that is already current comes back unchanged.

use chrono::{Local, NaiveDate, NaiveTime, TimeZone, Utc};
use scoresheet_core::sheets::{to_iso_millis, MatchData, MatchInfo, SetScore, SetScores};
use serde_json::{Map, Value};

pub fn migrate_match_data(raw: Value) -> Result<MatchData, serde_json::Error> {
    let mut payload = match raw {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    // Absent and null parts both fall back to blank defaults.
    payload.retain(|_, value| !value.is_null());

    let info = migrate_info(payload.get("info"));
    let scores = migrate_scores(payload.get("scores"));
    payload.insert("info".to_string(), serde_json::to_value(info)?);
    payload.insert("scores".to_string(), serde_json::to_value(scores)?);

    serde_json::from_value(Value::Object(payload))
}

fn migrate_info(info: Option<&Value>) -> MatchInfo {
    let text = |name: &str| {
        info.and_then(|info| info.get(name))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let mut date_time = text("dateTime");
    if date_time.is_empty() {
        let (date, time) = (text("date"), text("heure"));
        if !date.is_empty() && !time.is_empty() {
            date_time = compose_date_time(&date, &time).unwrap_or_default();
        }
    }

    MatchInfo {
        championship: text("championnat"),
        date_time,
        venue: text("salle"),
        referee_name: text("arbitreNom"),
        referee_license: text("arbitreLicence"),
        referee_club: text("arbitreClub"),
        self_refereed: info
            .and_then(|info| info.get("autoArbitrage"))
            .and_then(Value::as_bool)
            .unwrap_or(true),
    }
}

/// Interprets the legacy fields as device-local time and returns the UTC instant.
fn compose_date_time(date: &str, time: &str) -> Option<String> {
    let mut parts = date.trim().split('/');
    let day: u32 = parts.next()?.trim().parse().ok()?;
    let month: u32 = parts.next()?.trim().parse().ok()?;
    let year: i32 = parts.next()?.trim().parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let normalized = time.trim().replacen('h', ":", 1);
    let mut hm = normalized.split(':');
    let hour = number_or_zero(hm.next().unwrap_or_default())?;
    let minute = number_or_zero(hm.next().unwrap_or_default())?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;

    let local = Local.from_local_datetime(&date.and_time(time)).earliest()?;
    Some(to_iso_millis(&local.with_timezone(&Utc)))
}

fn number_or_zero(part: &str) -> Option<u32> {
    let part = part.trim();
    if part.is_empty() {
        Some(0)
    } else {
        part.parse().ok()
    }
}

fn migrate_scores(scores: Option<&Value>) -> SetScores {
    SetScores::from_array(
        SetScores::SET_NAMES.map(|name| migrate_set(scores.and_then(|scores| scores.get(name)))),
    )
}

fn migrate_set(set: Option<&Value>) -> SetScore {
    SetScore {
        a: points(set, "a"),
        b: points(set, "b"),
    }
}

fn points(set: Option<&Value>, side: &str) -> Option<u32> {
    let value = set?.get(side)?;
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        })
        .and_then(|n| u32::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDateTime};
    use scoresheet_core::sheets::TeamSide;
    use serde_json::json;

    use super::*;

    fn local_time_of(iso: &str) -> NaiveDateTime {
        DateTime::parse_from_rfc3339(iso)
            .expect("valid ISO instant")
            .with_timezone(&Local)
            .naive_local()
    }

    fn expected(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn composes_legacy_date_and_heure() {
        let data = migrate_match_data(json!({
            "info": { "date": "12/05/2024", "heure": "18h30" }
        }))
        .unwrap();

        assert!(data.info.date_time.ends_with(".000Z"));
        assert_eq!(
            local_time_of(&data.info.date_time),
            expected(2024, 5, 12, 18, 30)
        );
    }

    #[test]
    fn accepts_colon_separated_time_and_missing_minutes() {
        let colon = migrate_match_data(json!({
            "info": { "date": "01/10/2023", "heure": "09:05" }
        }))
        .unwrap();
        assert_eq!(
            local_time_of(&colon.info.date_time),
            expected(2023, 10, 1, 9, 5)
        );

        let hour_only = migrate_match_data(json!({
            "info": { "date": "01/10/2023", "heure": "20h" }
        }))
        .unwrap();
        assert_eq!(
            local_time_of(&hour_only.info.date_time),
            expected(2023, 10, 1, 20, 0)
        );
    }

    #[test]
    fn unparseable_legacy_date_leaves_date_time_empty() {
        for (date, heure) in [
            ("2024-05-12", "18h30"),
            ("31/02/2024", "18h30"),
            ("12/05/2024", "soir"),
            ("12/05/2024", "25h00"),
            ("12/05", "18h30"),
        ] {
            let data = migrate_match_data(json!({ "info": { "date": date, "heure": heure } }))
                .expect("migration never fails on bad dates");
            assert_eq!(data.info.date_time, "", "{date} {heure}");
        }
    }

    #[test]
    fn existing_date_time_wins_over_legacy_fields() {
        let data = migrate_match_data(json!({
            "info": {
                "dateTime": "2024-06-01T18:00:00.000Z",
                "date": "12/05/2024",
                "heure": "18h30"
            }
        }))
        .unwrap();
        assert_eq!(data.info.date_time, "2024-06-01T18:00:00.000Z");
    }

    #[test]
    fn fills_missing_metadata_with_defaults() {
        let data = migrate_match_data(json!({
            "info": { "championnat": "Division 1" }
        }))
        .unwrap();

        assert_eq!(data.info.championship, "Division 1");
        assert_eq!(data.info.venue, "");
        assert_eq!(data.info.referee_name, "");
        assert_eq!(data.info.referee_license, "");
        assert_eq!(data.info.referee_club, "");
        assert!(data.info.self_refereed);

        let explicit = migrate_match_data(json!({ "info": { "autoArbitrage": false } })).unwrap();
        assert!(!explicit.info.self_refereed);
    }

    #[test]
    fn normalizes_set_scores() {
        let data = migrate_match_data(json!({
            "scores": {
                "set1": { "a": 25, "b": 23 },
                "set2": { "a": null },
                "set4": { "a": 15.0, "b": -1 },
                "set5": null
            }
        }))
        .unwrap();

        assert_eq!(data.scores.set1, SetScore { a: Some(25), b: Some(23) });
        assert_eq!(data.scores.set2, SetScore { a: None, b: None });
        assert_eq!(data.scores.set3, SetScore { a: None, b: None });
        assert_eq!(data.scores.set4, SetScore { a: Some(15), b: None });
        assert_eq!(data.scores.set5, SetScore { a: None, b: None });
    }

    #[test]
    fn carries_over_the_rest_of_the_payload() {
        let data = migrate_match_data(json!({
            "equipeA": {
                "id": "A",
                "nom": "Les Smasheurs",
                "joueurs": [{ "id": "p1", "nom": "Martin", "prenom": "Léa", "numeroLicence": "123" }],
                "coach": "Paul",
                "capitaine": "Léa"
            },
            "resultat": { "vainqueur": "A", "scoreSets": "3-1" },
            "reclamations": "Filet trop bas",
            "signatures": { "capitaineA": "data:image/png;base64,AAAA", "capitaineB": null, "arbitre": null }
        }))
        .unwrap();

        assert_eq!(data.team_a.name, "Les Smasheurs");
        assert_eq!(data.team_a.players[0].first_name, "Léa");
        assert_eq!(data.team_b.id, TeamSide::B);
        assert_eq!(data.team_b.players.len(), 4);
        assert_eq!(data.result.winner, Some(TeamSide::A));
        assert_eq!(data.claims, "Filet trop bas");
        assert_eq!(
            data.signatures.captain_a.as_deref(),
            Some("data:image/png;base64,AAAA")
        );
    }

    #[test]
    fn non_object_payload_becomes_blank_sheet() {
        assert_eq!(migrate_match_data(Value::Null).unwrap(), MatchData::default());
        assert_eq!(migrate_match_data(json!("oops")).unwrap(), MatchData::default());
    }

    #[test]
    fn migration_is_idempotent() {
        let once = migrate_match_data(json!({
            "info": { "date": "12/05/2024", "heure": "18h30", "salle": "Gymnase Japy" },
            "scores": { "set1": { "a": 25 } },
            "reclamations": null
        }))
        .unwrap();
        let twice = migrate_match_data(serde_json::to_value(&once).unwrap()).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn incompatible_team_shape_is_an_error() {
        let err = migrate_match_data(json!({ "equipeA": { "id": "Z" } }));
        assert!(err.is_err());
    }
}
