//! Signaling-Protokoll (WebSocket, JSON-Textframes)
//!
//! Definiert alle Ereignisse die ueber die WebSocket-Verbindung zwischen
//! Browser-Client und Relay ausgetauscht werden.
//!
//! ## Design
//! - Umschlag `{"event": "...", "payload": {...}}` via adjacently tagged Enums
//! - Einweg-Ereignisse ohne Request/Response-Zuordnung
//! - Offer/Answer-Inhalte sind opakes JSON und werden nie interpretiert
//! - Alte Ereignis- und Feldnamen (`user:call`, `peer:nego:*`, `email`, `ans`)
//!   werden beim Dekodieren als Alias akzeptiert
//! - Wer alte Namen sendet, bekommt im selben [`Dialekt`] geantwortet

use serde::{Deserialize, Serialize};
use sprechstunde_core::{ClientIdentity, ConnectionId, RoomKey, SprechstundeError};

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Fehler-Codes fuer optionale negative Bestaetigungen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Nachricht war kein gueltiger Umschlag oder Payload
    InvalidMessage,
    /// Ziel-Handle hat keine aktive Verbindung
    UnknownTarget,
    /// Nachrichtenlimit der Verbindung ueberschritten
    RateLimited,
}

// ---------------------------------------------------------------------------
// Dialekt
// ---------------------------------------------------------------------------

/// Namensschema eines Clients
///
/// Clients der ersten App-Generation senden und erwarten die alten Ereignis-
/// und Feldnamen. Der Relay erkennt sie an ihren eigenen Nachrichten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialekt {
    #[default]
    Kanonisch,
    Alt,
}

const ALTE_EREIGNISSE: &[&str] = &["user:call", "peer:nego:needed", "peer:nego:done"];
const ALTE_FELDER: &[&str] = &["email", "ans"];

impl Dialekt {
    /// Erkennt das Schema an einem bereits geparsten Umschlag
    pub fn erkennen(umschlag: &serde_json::Value) -> Self {
        let alter_name = umschlag
            .get("event")
            .and_then(|e| e.as_str())
            .is_some_and(|e| ALTE_EREIGNISSE.contains(&e));
        let altes_feld = umschlag
            .get("payload")
            .and_then(|p| p.as_object())
            .is_some_and(|p| ALTE_FELDER.iter().any(|f| p.contains_key(*f)));

        if alter_name || altes_feld {
            Self::Alt
        } else {
            Self::Kanonisch
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Raum beitreten (und Bestaetigung an den Absender)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomJoinPayload {
    #[serde(alias = "email")]
    pub identity: ClientIdentity,
    pub room: RoomKey,
}

/// Gezieltes Offer an ein anderes Handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferPayload {
    pub to: ConnectionId,
    pub offer: serde_json::Value,
}

/// Gezielte Answer an ein anderes Handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub to: ConnectionId,
    #[serde(alias = "ans")]
    pub answer: serde_json::Value,
}

/// Negative Bestaetigung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    /// Ereignisname der ausloesenden Nachricht, falls erkennbar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

// ---------------------------------------------------------------------------
// Client -> Relay
// ---------------------------------------------------------------------------

/// Alle Ereignisse die ein Client an den Relay senden darf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ClientEvent {
    #[serde(rename = "room:join")]
    RoomJoin(RoomJoinPayload),

    #[serde(rename = "call:offer", alias = "user:call")]
    CallOffer(OfferPayload),

    #[serde(rename = "call:accepted")]
    CallAccepted(AnswerPayload),

    #[serde(rename = "negotiation:needed", alias = "peer:nego:needed")]
    NegotiationNeeded(OfferPayload),

    #[serde(rename = "negotiation:done", alias = "peer:nego:done")]
    NegotiationDone(AnswerPayload),
}

impl ClientEvent {
    /// Dekodiert einen Textframe
    pub fn aus_text(text: &str) -> Result<Self, SprechstundeError> {
        Self::aus_text_mit_dialekt(text).map(|(event, _)| event)
    }

    /// Dekodiert einen Textframe und erkennt dabei den Dialekt des Absenders
    pub fn aus_text_mit_dialekt(text: &str) -> Result<(Self, Dialekt), SprechstundeError> {
        let umschlag: serde_json::Value = serde_json::from_str(text).map_err(ungueltig)?;
        let dialekt = Dialekt::erkennen(&umschlag);
        let event = serde_json::from_value(umschlag).map_err(ungueltig)?;
        Ok((event, dialekt))
    }

    /// Kanonischer Ereignisname
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomJoin(_) => "room:join",
            Self::CallOffer(_) => "call:offer",
            Self::CallAccepted(_) => "call:accepted",
            Self::NegotiationNeeded(_) => "negotiation:needed",
            Self::NegotiationDone(_) => "negotiation:done",
        }
    }

    /// Ziel-Handle bei gezielten Ereignissen
    pub fn ziel(&self) -> Option<ConnectionId> {
        match self {
            Self::RoomJoin(_) => None,
            Self::CallOffer(p) | Self::NegotiationNeeded(p) => Some(p.to),
            Self::CallAccepted(p) | Self::NegotiationDone(p) => Some(p.to),
        }
    }
}

fn ungueltig(e: serde_json::Error) -> SprechstundeError {
    SprechstundeError::UngueltigeNachricht(e.to_string())
}

/// Liest den Ereignisnamen aus einem (evtl. ungueltigen) Umschlag
///
/// Wird nur fuer Log-Ausgaben und negative Bestaetigungen benutzt.
pub fn ereignis_name_lesen(text: &str) -> Option<String> {
    let wert: serde_json::Value = serde_json::from_str(text).ok()?;
    wert.get("event")?.as_str().map(str::to_string)
}

// ---------------------------------------------------------------------------
// Relay -> Client
// ---------------------------------------------------------------------------

/// Alle Ereignisse die der Relay an Clients sendet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ServerEvent {
    /// Bestaetigung des eigenen Beitritts
    #[serde(rename = "room:join")]
    RoomJoined(RoomJoinPayload),

    /// Ein anderer Client ist dem Raum beigetreten
    #[serde(rename = "user:joined")]
    UserJoined {
        identity: ClientIdentity,
        id: ConnectionId,
    },

    #[serde(rename = "incoming:call")]
    IncomingCall {
        from: ConnectionId,
        offer: serde_json::Value,
    },

    #[serde(rename = "call:accepted")]
    CallAccepted {
        from: ConnectionId,
        answer: serde_json::Value,
    },

    #[serde(rename = "negotiation:needed")]
    NegotiationNeeded {
        from: ConnectionId,
        offer: serde_json::Value,
    },

    #[serde(rename = "negotiation:final")]
    NegotiationFinal {
        from: ConnectionId,
        answer: serde_json::Value,
    },

    /// Ein Raummitglied hat die Verbindung getrennt (nur mit `verlassen_melden`)
    #[serde(rename = "user:left")]
    UserLeft {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identity: Option<ClientIdentity>,
        id: ConnectionId,
    },

    /// Die Identitaet wurde von einer neueren Verbindung uebernommen
    /// (nur mit `ersetzung_melden`)
    #[serde(rename = "session:replaced")]
    SessionReplaced {
        identity: ClientIdentity,
        id: ConnectionId,
    },

    /// Negative Bestaetigung (nur mit `fehler_melden`)
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

impl ServerEvent {
    /// Erstellt eine negative Bestaetigung
    pub fn error(code: ErrorCode, message: impl Into<String>, event: Option<String>) -> Self {
        Self::Error(ErrorPayload {
            code,
            message: message.into(),
            event,
        })
    }

    /// Serialisiert das Ereignis als JSON-Textframe
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Serialisiert das Ereignis im Dialekt des Empfaengers
    ///
    /// Im alten Dialekt heissen `incoming:call`, `negotiation:needed` und
    /// `negotiation:final` wie in der ersten App-Generation (inklusive deren
    /// Schreibweise `incomming:call`), `identity` wird zu `email` und
    /// `answer` zu `ans`.
    pub fn to_json_im_dialekt(&self, dialekt: Dialekt) -> serde_json::Result<String> {
        if dialekt == Dialekt::Kanonisch {
            return self.to_json();
        }

        let mut umschlag = serde_json::to_value(self)?;
        if let Some(felder) = umschlag.as_object_mut() {
            if let Some(name) = self.alter_name() {
                felder.insert("event".to_string(), name.into());
            }
            if let Some(payload) = felder.get_mut("payload").and_then(|p| p.as_object_mut()) {
                feld_umbenennen(payload, "identity", "email");
                feld_umbenennen(payload, "answer", "ans");
            }
        }
        serde_json::to_string(&umschlag)
    }

    fn alter_name(&self) -> Option<&'static str> {
        match self {
            Self::IncomingCall { .. } => Some("incomming:call"),
            Self::NegotiationNeeded { .. } => Some("peer:nego:needed"),
            Self::NegotiationFinal { .. } => Some("peer:nego:final"),
            _ => None,
        }
    }

    /// Deserialisiert ein Ereignis (Client-Seite, Tests)
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Kanonischer Ereignisname
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomJoined(_) => "room:join",
            Self::UserJoined { .. } => "user:joined",
            Self::IncomingCall { .. } => "incoming:call",
            Self::CallAccepted { .. } => "call:accepted",
            Self::NegotiationNeeded { .. } => "negotiation:needed",
            Self::NegotiationFinal { .. } => "negotiation:final",
            Self::UserLeft { .. } => "user:left",
            Self::SessionReplaced { .. } => "session:replaced",
            Self::Error(_) => "error",
        }
    }
}

fn feld_umbenennen(
    payload: &mut serde_json::Map<String, serde_json::Value>,
    von: &str,
    nach: &str,
) {
    if let Some(wert) = payload.remove(von) {
        payload.insert(nach.to_string(), wert);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn room_join_dekodieren() {
        let text = r#"{"event":"room:join","payload":{"identity":"a@x.com","room":"r1"}}"#;
        let event = ClientEvent::aus_text(text).unwrap();
        match event {
            ClientEvent::RoomJoin(p) => {
                assert_eq!(p.identity.as_str(), "a@x.com");
                assert_eq!(p.room.as_str(), "r1");
            }
            andere => panic!("Erwartet RoomJoin, erhalten {andere:?}"),
        }
    }

    #[test]
    fn alte_feldnamen_werden_akzeptiert() {
        let text = r#"{"event":"room:join","payload":{"email":"b@x.com","room":"r1"}}"#;
        let ClientEvent::RoomJoin(p) = ClientEvent::aus_text(text).unwrap() else {
            panic!("Erwartet RoomJoin");
        };
        assert_eq!(p.identity.as_str(), "b@x.com");

        let ziel = ConnectionId::new();
        let text = json!({"event": "peer:nego:done", "payload": {"to": ziel, "ans": {"sdp": "x"}}})
            .to_string();
        let event = ClientEvent::aus_text(&text).unwrap();
        assert_eq!(event.name(), "negotiation:done");
        assert_eq!(event.ziel(), Some(ziel));
    }

    #[test]
    fn alte_ereignisnamen_werden_akzeptiert() {
        let ziel = ConnectionId::new();
        let text = json!({"event": "user:call", "payload": {"to": ziel, "offer": {"type": "offer"}}})
            .to_string();
        assert!(matches!(
            ClientEvent::aus_text(&text).unwrap(),
            ClientEvent::CallOffer(_)
        ));

        let text =
            json!({"event": "peer:nego:needed", "payload": {"to": ziel, "offer": 1}}).to_string();
        assert!(matches!(
            ClientEvent::aus_text(&text).unwrap(),
            ClientEvent::NegotiationNeeded(_)
        ));
    }

    #[test]
    fn dialekt_wird_erkannt() {
        let ziel = ConnectionId::new();
        let faelle = [
            (json!({"event": "room:join", "payload": {"identity": "a@x.com", "room": "r1"}}), Dialekt::Kanonisch),
            (json!({"event": "room:join", "payload": {"email": "a@x.com", "room": "r1"}}), Dialekt::Alt),
            (json!({"event": "user:call", "payload": {"to": ziel, "offer": {}}}), Dialekt::Alt),
            (json!({"event": "call:accepted", "payload": {"to": ziel, "ans": {}}}), Dialekt::Alt),
            (json!({"event": "call:accepted", "payload": {"to": ziel, "answer": {}}}), Dialekt::Kanonisch),
        ];
        for (umschlag, erwartet) in faelle {
            let (_, dialekt) = ClientEvent::aus_text_mit_dialekt(&umschlag.to_string()).unwrap();
            assert_eq!(dialekt, erwartet, "{umschlag}");
        }
    }

    #[test]
    fn alter_dialekt_beim_senden() {
        let von = ConnectionId::new();
        let alt = |event: ServerEvent| -> serde_json::Value {
            serde_json::from_str(&event.to_json_im_dialekt(Dialekt::Alt).unwrap()).unwrap()
        };

        let wert = alt(ServerEvent::IncomingCall { from: von, offer: json!({"sdp": "o"}) });
        assert_eq!(wert["event"], "incomming:call");
        assert_eq!(wert["payload"]["from"], von.to_string());
        assert_eq!(wert["payload"]["offer"]["sdp"], "o");

        let wert = alt(ServerEvent::CallAccepted { from: von, answer: json!({"sdp": "a"}) });
        assert_eq!(wert["event"], "call:accepted");
        assert_eq!(wert["payload"]["ans"]["sdp"], "a");
        assert!(wert["payload"].get("answer").is_none());

        let wert = alt(ServerEvent::NegotiationFinal { from: von, answer: json!(2) });
        assert_eq!(wert["event"], "peer:nego:final");
        assert_eq!(wert["payload"]["ans"], 2);

        let wert = alt(ServerEvent::NegotiationNeeded { from: von, offer: json!(1) });
        assert_eq!(wert["event"], "peer:nego:needed");

        let wert = alt(ServerEvent::UserJoined {
            identity: ClientIdentity::neu("b@x.com").unwrap(),
            id: von,
        });
        assert_eq!(wert["event"], "user:joined");
        assert_eq!(wert["payload"]["email"], "b@x.com");
    }

    #[test]
    fn kanonischer_dialekt_entspricht_to_json() {
        let event = ServerEvent::NegotiationFinal {
            from: ConnectionId::new(),
            answer: json!({"sdp": "a"}),
        };
        assert_eq!(
            event.to_json_im_dialekt(Dialekt::Kanonisch).unwrap(),
            event.to_json().unwrap()
        );
    }

    #[test]
    fn offer_bleibt_unveraendert() {
        let ziel = ConnectionId::new();
        let offer = json!({"type": "offer", "sdp": "v=0\r\no=- 42 2 IN IP4 127.0.0.1", "extra": [1, 2]});
        let text = json!({"event": "call:offer", "payload": {"to": ziel, "offer": offer}}).to_string();
        let ClientEvent::CallOffer(p) = ClientEvent::aus_text(&text).unwrap() else {
            panic!("Erwartet CallOffer");
        };
        assert_eq!(p.offer, offer);
    }

    #[test]
    fn ungueltige_nachrichten_werden_abgelehnt() {
        // Kein JSON
        assert!(ClientEvent::aus_text("hallo").is_err());
        // Unbekanntes Ereignis
        assert!(ClientEvent::aus_text(r#"{"event":"room:leave","payload":{}}"#).is_err());
        // Ziel ist kein Handle
        assert!(ClientEvent::aus_text(
            r#"{"event":"call:offer","payload":{"to":"socket-1","offer":{}}}"#
        )
        .is_err());
        // Leere Identitaet
        assert!(ClientEvent::aus_text(
            r#"{"event":"room:join","payload":{"identity":"","room":"r1"}}"#
        )
        .is_err());
        // Fehlendes Offer
        let ziel = ConnectionId::new();
        let text = json!({"event": "call:offer", "payload": {"to": ziel}}).to_string();
        assert!(ClientEvent::aus_text(&text).is_err());
    }

    #[test]
    fn ereignis_name_aus_ungueltigem_umschlag() {
        assert_eq!(
            ereignis_name_lesen(r#"{"event":"call:offer","payload":{"to":"x"}}"#).as_deref(),
            Some("call:offer")
        );
        assert_eq!(ereignis_name_lesen("kein json"), None);
        assert_eq!(ereignis_name_lesen(r#"{"payload":{}}"#), None);
    }

    #[test]
    fn incoming_call_format() {
        let von = ConnectionId::new();
        let event = ServerEvent::IncomingCall {
            from: von,
            offer: json!({"sdp": "abc"}),
        };
        let wert: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(wert["event"], "incoming:call");
        assert_eq!(wert["payload"]["from"], von.to_string());
        assert_eq!(wert["payload"]["offer"]["sdp"], "abc");
    }

    #[test]
    fn user_joined_format() {
        let id = ConnectionId::new();
        let event = ServerEvent::UserJoined {
            identity: ClientIdentity::neu("b@x.com").unwrap(),
            id,
        };
        let wert: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(wert["event"], "user:joined");
        assert_eq!(wert["payload"]["identity"], "b@x.com");
        assert_eq!(wert["payload"]["id"], id.to_string());
    }

    #[test]
    fn user_left_ohne_identitaet() {
        let event = ServerEvent::UserLeft {
            identity: None,
            id: ConnectionId::new(),
        };
        let json = event.to_json().unwrap();
        assert!(!json.contains("identity"));
        assert_eq!(ServerEvent::from_json(&json).unwrap(), event);
    }

    #[test]
    fn error_serialisierung() {
        let event = ServerEvent::error(
            ErrorCode::UnknownTarget,
            "Ziel nicht verbunden",
            Some("call:offer".into()),
        );
        let json = event.to_json().unwrap();
        assert!(json.contains("\"code\":\"UNKNOWN_TARGET\""));
        assert!(json.contains("\"event\":\"error\""));
        assert_eq!(event.name(), "error");
    }
}
