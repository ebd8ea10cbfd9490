//! Room-Handler – `room:join`

use sprechstunde_protocol::RoomJoinPayload;
use std::sync::Arc;

use crate::error::SignalingResult;
use crate::lifecycle::Lebenszyklus;
use crate::relay::Beitritt;
use crate::server_state::SignalingState;

/// Verarbeitet `room:join`
///
/// Bindet die behauptete Identitaet an die Verbindung, tritt dem Raum bei,
/// meldet `user:joined` an die uebrigen Mitglieder und bestaetigt dem
/// Absender mit demselben Payload. Die Identitaet wird nicht geprueft.
pub fn handle_room_join(
    payload: RoomJoinPayload,
    lebenszyklus: &mut Lebenszyklus,
    state: &Arc<SignalingState>,
) -> SignalingResult<Beitritt> {
    let RoomJoinPayload { identity, room } = payload;
    let beitritt = state
        .relay
        .raum_beitreten(lebenszyklus.verbindung(), identity, room.clone())?;

    if let Some(alt) = beitritt.ersetzt {
        tracing::debug!(
            verbindung = %lebenszyklus.verbindung(),
            ersetzt = %alt,
            "Identitaet von aelterer Verbindung uebernommen"
        );
    }

    lebenszyklus.beigetreten(room);
    Ok(beitritt)
}
