//! Nachrichtenlimit pro Verbindung
//!
//! Token-Bucket pro WebSocket-Verbindung. Ein Client der den Relay flutet
//! verliert nur seine eigenen Nachrichten, der gemeinsame Zustand bleibt
//! fuer alle anderen Verbindungen erreichbar.

use std::time::Instant;

/// Ein Token-Bucket fuer eine einzelne Verbindung
#[derive(Debug)]
pub struct TokenBucket {
    /// Aktuelle Token-Anzahl (als f64 fuer Bruchteil-Auffuellung)
    token: f64,
    /// Maximale Token-Anzahl (= Burst-Limit)
    max_token: f64,
    /// Auffuellrate in Token pro Sekunde
    fuellrate: f64,
    /// Letzter Zeitpunkt der Auffuellung
    letzte_auffuellung: Instant,
}

impl TokenBucket {
    pub fn neu(max_nachrichten_pro_minute: u32) -> Self {
        let max = max_nachrichten_pro_minute as f64;
        Self {
            token: max,
            max_token: max,
            fuellrate: max / 60.0,
            letzte_auffuellung: Instant::now(),
        }
    }

    /// Versucht ein Token zu verbrauchen. Gibt `true` zurueck wenn erlaubt.
    pub fn verbrauchen(&mut self) -> bool {
        self.auffuellen();
        if self.token >= 1.0 {
            self.token -= 1.0;
            true
        } else {
            false
        }
    }

    fn auffuellen(&mut self) {
        let jetzt = Instant::now();
        let vergangen = jetzt.duration_since(self.letzte_auffuellung).as_secs_f64();
        self.token = (self.token + vergangen * self.fuellrate).min(self.max_token);
        self.letzte_auffuellung = jetzt;
    }
}

/// Nachrichtenlimit einer Verbindung; `0` bedeutet unbegrenzt
#[derive(Debug)]
pub struct NachrichtenLimit {
    bucket: Option<TokenBucket>,
}

impl NachrichtenLimit {
    pub fn neu(nachrichten_pro_minute: u32) -> Self {
        let bucket = (nachrichten_pro_minute > 0).then(|| TokenBucket::neu(nachrichten_pro_minute));
        Self { bucket }
    }

    /// Prueft und verbraucht das Limit fuer eine eingehende Nachricht
    pub fn pruefen(&mut self) -> bool {
        match self.bucket.as_mut() {
            Some(bucket) => bucket.verbrauchen(),
            None => true,
        }
    }
}
