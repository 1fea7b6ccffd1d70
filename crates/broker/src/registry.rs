//! Registry – Einzige Autoritaet ueber Client- und Kanal-Zustand
//!
//! Zwei voneinander unabhaengige Sammlungen: Clients (indiziert nach
//! Quell-Adresse) und Kanaele (indiziert nach Kennung). Lesezugriffe
//! liefern Schnappschuesse die ohne weitere Sperren iteriert werden
//! koennen.
//!
//! ## Sperr-Disziplin
//! Keine Methode ruft eine andere Registry-Methode auf waehrend sie
//! einen Shard-Guard haelt; Schluessel werden zuerst gesammelt, dann
//! wird mutiert. Sammlungsuebergreifende Arbeit (Benachrichtigungen
//! nach Kanal-Loeschung) passiert ausserhalb: die Methoden geben die
//! betroffenen Empfaenger zurueck und der Aufrufer verschickt.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use switchboard_core::{ChannelGuid, ClientGuid};

use crate::broadcast::ClientSender;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Zustand einer verbundenen Client-Verbindung
///
/// Vor der Anmeldung ist der Client nur ueber seine Quell-Adresse
/// adressierbar; `guid` und `email` werden beim Login gesetzt.
#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub guid: Option<ClientGuid>,
    pub email: Option<String>,
    pub adresse: SocketAddr,
    /// Transport-Griff: Send-Queue des Verbindungs-Tasks
    pub sender: ClientSender,
    pub angemeldet: bool,
    pub erstellt_am: DateTime<Utc>,
    pub aktualisiert_am: DateTime<Utc>,
}

impl ClientRecord {
    /// Erstellt einen frischen, nicht angemeldeten Record
    pub fn neu(adresse: SocketAddr, sender: ClientSender) -> Self {
        let jetzt = Utc::now();
        Self {
            guid: None,
            email: None,
            adresse,
            sender,
            angemeldet: false,
            erstellt_am: jetzt,
            aktualisiert_am: jetzt,
        }
    }
}

/// Zustand eines Kanals
#[derive(Debug, Clone)]
pub struct KanalRecord {
    pub guid: ChannelGuid,
    pub name: String,
    pub besitzer: ClientGuid,
    pub privat: bool,
    pub erstellt_am: DateTime<Utc>,
    pub aktualisiert_am: DateTime<Utc>,
    /// Geordnete, duplikatfreie Abonnenten-Liste (Besitzer immer enthalten)
    pub abonnenten: Vec<ClientGuid>,
}

impl KanalRecord {
    /// Erstellt einen neuen Kanal; der Besitzer wird beim Einfuegen
    /// in die Registry als erster Abonnent eingetragen
    pub fn neu(guid: ChannelGuid, name: impl Into<String>, besitzer: ClientGuid, privat: bool) -> Self {
        let jetzt = Utc::now();
        Self {
            guid,
            name: name.into(),
            besitzer,
            privat,
            erstellt_am: jetzt,
            aktualisiert_am: jetzt,
            abonnenten: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Prozessweite Verwaltung von Clients und Kanaelen
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// Clients, indiziert nach Quell-Adresse (ip, port)
    clients: DashMap<SocketAddr, ClientRecord>,
    /// Kanaele, indiziert nach Kennung
    kanaele: DashMap<ChannelGuid, KanalRecord>,
}

impl Registry {
    /// Erstellt eine neue leere Registry
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                clients: DashMap::new(),
                kanaele: DashMap::new(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Clients
    // -----------------------------------------------------------------------

    /// Fuegt einen Client ein oder ersetzt den Transport-Griff
    ///
    /// Existiert unter derselben Quell-Adresse bereits ein Record, so
    /// behaelt er seine Identitaet (guid, email, Anmelde-Flag,
    /// Erstellzeit); nur der Transport-Griff wird getauscht und die
    /// Aktualisierungszeit aufgefrischt. So kann ein Client ueber
    /// dieselbe Quell-Adresse neu verbinden bevor der Login durch ist.
    pub fn client_hinzufuegen(&self, record: ClientRecord) {
        match self.inner.clients.entry(record.adresse) {
            dashmap::mapref::entry::Entry::Occupied(mut vorhanden) => {
                let alt = vorhanden.get_mut();
                alt.sender = record.sender;
                alt.aktualisiert_am = Utc::now();
                tracing::debug!(adresse = %record.adresse, "Transport-Griff ersetzt");
            }
            dashmap::mapref::entry::Entry::Vacant(frei) => {
                tracing::debug!(adresse = %record.adresse, "Client eingetragen");
                frei.insert(record);
            }
        }
    }

    /// Entfernt einen Client: bevorzugt nach Kennung, sonst nach Adresse
    pub fn client_entfernen(&self, record: &ClientRecord) -> bool {
        if let Some(guid) = &record.guid {
            let adresse = self
                .inner
                .clients
                .iter()
                .find(|e| e.value().guid.as_ref() == Some(guid))
                .map(|e| *e.key());
            if let Some(adresse) = adresse {
                return self.inner.clients.remove(&adresse).is_some();
            }
        }
        self.inner.clients.remove(&record.adresse).is_some()
    }

    /// Entfernt den Client unter der angegebenen Quell-Adresse
    ///
    /// Gibt den entfernten Record zurueck; `None` wenn dort (nicht mehr)
    /// etwas liegt – die Raeumung ist damit idempotent.
    pub fn client_entfernen_nach_adresse(&self, adresse: &SocketAddr) -> Option<ClientRecord> {
        self.inner.clients.remove(adresse).map(|(_, record)| record)
    }

    /// Anmeldung: setzt Identitaet und Anmelde-Flag des Clients
    ///
    /// Abgleich zuerst ueber die Kennung, sonst ueber die Quell-Adresse.
    /// Meldet sich eine bereits bekannte Kennung von einer neuen
    /// Quell-Adresse an, wird der alte Record entfernt: die neue
    /// Verbindung ersetzt den Transport-Griff.
    pub fn client_aktualisieren(
        &self,
        adresse: &SocketAddr,
        guid: ClientGuid,
        email: Option<String>,
    ) -> Option<ClientRecord> {
        // Alten Record mit derselben Kennung an anderer Adresse suchen
        let alte_adresse = self
            .inner
            .clients
            .iter()
            .find(|e| e.value().guid.as_ref() == Some(&guid) && e.key() != adresse)
            .map(|e| *e.key());
        if let Some(alte) = alte_adresse {
            self.inner.clients.remove(&alte);
            tracing::info!(
                guid = %guid,
                alte_adresse = %alte,
                neue_adresse = %adresse,
                "Wiederanmeldung – alter Transport-Griff verworfen"
            );
        }

        let mut eintrag = self.inner.clients.get_mut(adresse)?;
        eintrag.guid = Some(guid);
        eintrag.email = email;
        eintrag.angemeldet = true;
        eintrag.aktualisiert_am = Utc::now();
        Some(eintrag.clone())
    }

    /// Sucht einen Client ueber seine Kennung
    pub fn client_nach_guid(&self, guid: &ClientGuid) -> Option<ClientRecord> {
        self.inner
            .clients
            .iter()
            .find(|e| e.value().guid.as_ref() == Some(guid))
            .map(|e| e.value().clone())
    }

    /// Sucht den Client unter einer Quell-Adresse
    pub fn client_nach_adresse(&self, adresse: &SocketAddr) -> Option<ClientRecord> {
        self.inner.clients.get(adresse).map(|e| e.value().clone())
    }

    /// Gibt den Send-Queue-Handle eines Clients zurueck
    pub fn sender_nach_guid(&self, guid: &ClientGuid) -> Option<ClientSender> {
        self.client_nach_guid(guid).map(|record| record.sender)
    }

    /// Schnappschuss aller Clients
    pub fn alle_clients(&self) -> Vec<ClientRecord> {
        self.inner.clients.iter().map(|e| e.value().clone()).collect()
    }

    /// Prueft ob ein angemeldeter Client mit dieser Kennung verbunden ist
    pub fn ist_client_verbunden(&self, guid: &ClientGuid) -> bool {
        self.client_nach_guid(guid)
            .map(|record| record.angemeldet && record.sender.ist_lebendig())
            .unwrap_or(false)
    }

    /// Anzahl der eingetragenen Verbindungen
    pub fn client_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    // -----------------------------------------------------------------------
    // Kanaele
    // -----------------------------------------------------------------------

    /// Legt einen Kanal an; der Besitzer wird als erster Abonnent gesetzt
    ///
    /// Gibt `false` zurueck wenn die Kennung bereits vergeben ist.
    /// Namens-Kollisionen prueft der Aufrufer vorher.
    pub fn kanal_hinzufuegen(&self, besitzer: ClientGuid, mut kanal: KanalRecord) -> bool {
        match self.inner.kanaele.entry(kanal.guid.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(frei) => {
                let jetzt = Utc::now();
                kanal.besitzer = besitzer.clone();
                kanal.erstellt_am = jetzt;
                kanal.aktualisiert_am = jetzt;
                kanal.abonnenten.retain(|g| g != &besitzer);
                kanal.abonnenten.insert(0, besitzer);
                tracing::info!(kanal = %kanal.guid, name = %kanal.name, "Kanal angelegt");
                frei.insert(kanal);
                true
            }
        }
    }

    /// Entfernt einen Kanal
    ///
    /// Gibt den Record und die uebrigen Abonnenten (ohne Besitzer)
    /// zurueck, damit der Aufrufer die Loeschungs-Benachrichtigungen
    /// verschicken kann. Ohne weitere Abonnenten ist die Liste leer.
    pub fn kanal_entfernen(&self, guid: &ChannelGuid) -> Option<(KanalRecord, Vec<ClientGuid>)> {
        let (_, kanal) = self.inner.kanaele.remove(guid)?;
        let andere: Vec<ClientGuid> = kanal
            .abonnenten
            .iter()
            .filter(|g| **g != kanal.besitzer)
            .cloned()
            .collect();
        tracing::info!(kanal = %kanal.guid, name = %kanal.name, "Kanal entfernt");
        Some((kanal, andere))
    }

    /// Traegt einen Abonnenten in einen Kanal ein
    ///
    /// Gibt `None` zurueck wenn der Kanal fehlt, sonst `Some(neu)`:
    /// `true` wenn der Abonnent neu ist, `false` wenn er schon drin war
    /// (die Liste bleibt duplikatfrei).
    pub fn kanal_abonnent_hinzufuegen(
        &self,
        guid: &ChannelGuid,
        abonnent: ClientGuid,
    ) -> Option<bool> {
        let mut kanal = self.inner.kanaele.get_mut(guid)?;
        if kanal.abonnenten.contains(&abonnent) {
            return Some(false);
        }
        kanal.abonnenten.push(abonnent);
        kanal.aktualisiert_am = Utc::now();
        Some(true)
    }

    /// Traegt einen Abonnenten aus einem Kanal aus
    ///
    /// Gibt `None` zurueck wenn der Kanal fehlt, sonst `Some(entfernt)`.
    pub fn kanal_abonnent_entfernen(
        &self,
        guid: &ChannelGuid,
        abonnent: &ClientGuid,
    ) -> Option<bool> {
        let mut kanal = self.inner.kanaele.get_mut(guid)?;
        let vorher = kanal.abonnenten.len();
        kanal.abonnenten.retain(|g| g != abonnent);
        let entfernt = kanal.abonnenten.len() < vorher;
        if entfernt {
            kanal.aktualisiert_am = Utc::now();
        }
        Some(entfernt)
    }

    /// Prueft ob ein Client einen Kanal abonniert hat
    pub fn ist_kanal_abonnent(&self, guid: &ChannelGuid, abonnent: &ClientGuid) -> bool {
        self.inner
            .kanaele
            .get(guid)
            .map(|kanal| kanal.abonnenten.contains(abonnent))
            .unwrap_or(false)
    }

    /// Sucht einen Kanal ueber seine Kennung
    pub fn kanal_nach_guid(&self, guid: &ChannelGuid) -> Option<KanalRecord> {
        self.inner.kanaele.get(guid).map(|e| e.value().clone())
    }

    /// Sucht einen Kanal ueber seinen Namen (ohne Gross-/Kleinschreibung)
    pub fn kanal_nach_name(&self, name: &str) -> Option<KanalRecord> {
        self.inner
            .kanaele
            .iter()
            .find(|e| e.value().name.eq_ignore_ascii_case(name))
            .map(|e| e.value().clone())
    }

    /// Schnappschuss aller Kanaele
    pub fn alle_kanaele(&self) -> Vec<KanalRecord> {
        self.inner.kanaele.iter().map(|e| e.value().clone()).collect()
    }

    /// Schnappschuss der Abonnenten eines Kanals
    pub fn kanal_abonnenten(&self, guid: &ChannelGuid) -> Option<Vec<ClientGuid>> {
        self.inner
            .kanaele
            .get(guid)
            .map(|kanal| kanal.abonnenten.clone())
    }

    /// Entfernt alle Kanaele deren Besitzer der angegebene Client ist
    ///
    /// Gibt pro entferntem Kanal den Record und die zu
    /// benachrichtigenden uebrigen Abonnenten zurueck.
    pub fn client_kanaele_entfernen(
        &self,
        besitzer: &ClientGuid,
    ) -> Vec<(KanalRecord, Vec<ClientGuid>)> {
        let betroffen: Vec<ChannelGuid> = self
            .inner
            .kanaele
            .iter()
            .filter(|e| e.value().besitzer == *besitzer)
            .map(|e| e.key().clone())
            .collect();

        betroffen
            .iter()
            .filter_map(|guid| self.kanal_entfernen(guid))
            .collect()
    }

    /// Traegt einen Client aus allen fremden Kanaelen als Abonnent aus
    pub fn abonnent_ueberall_entfernen(&self, abonnent: &ClientGuid) {
        self.inner.kanaele.iter_mut().for_each(|mut kanal| {
            let vorher = kanal.abonnenten.len();
            kanal.abonnenten.retain(|g| g != abonnent);
            if kanal.abonnenten.len() < vorher {
                kanal.aktualisiert_am = Utc::now();
            }
        });
    }

    /// Anzahl der Kanaele
    pub fn kanal_anzahl(&self) -> usize {
        self.inner.kanaele.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn adresse(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn test_client(
        port: u16,
    ) -> (
        ClientRecord,
        tokio::sync::mpsc::Receiver<switchboard_protocol::Nachricht>,
    ) {
        let (sender, rx) = ClientSender::neu(adresse(port));
        (ClientRecord::neu(adresse(port), sender), rx)
    }

    fn test_kanal(guid: &str, name: &str) -> KanalRecord {
        KanalRecord::neu(ChannelGuid::from(guid), name, ClientGuid::from("niemand"), false)
    }

    #[test]
    fn client_einfuegen_und_finden() {
        let registry = Registry::neu();
        let (client, _rx) = test_client(5000);
        registry.client_hinzufuegen(client);
        assert_eq!(registry.client_anzahl(), 1);
        assert!(registry.client_nach_adresse(&adresse(5000)).is_some());
    }

    #[test]
    fn einfuegen_an_gleicher_adresse_behaelt_identitaet() {
        let registry = Registry::neu();
        let (client, _rx1) = test_client(5000);
        registry.client_hinzufuegen(client);
        registry.client_aktualisieren(&adresse(5000), ClientGuid::from("c1"), Some("c1@x".into()));

        // Neuer Transport-Griff unter derselben Adresse
        let (ersatz, _rx2) = test_client(5000);
        registry.client_hinzufuegen(ersatz);

        let record = registry
            .client_nach_adresse(&adresse(5000))
            .expect("Record erwartet");
        assert_eq!(record.guid.as_ref().unwrap().as_str(), "c1");
        assert_eq!(record.email.as_deref(), Some("c1@x"));
        assert!(record.angemeldet);
        assert_eq!(registry.client_anzahl(), 1);
    }

    #[test]
    fn aktualisieren_meldet_an() {
        let registry = Registry::neu();
        let (client, _rx) = test_client(5000);
        registry.client_hinzufuegen(client);

        let record = registry
            .client_aktualisieren(&adresse(5000), ClientGuid::from("c1"), Some("c1@x".into()))
            .expect("Record erwartet");
        assert!(record.angemeldet);
        assert!(registry.ist_client_verbunden(&ClientGuid::from("c1")));
    }

    #[test]
    fn wiederanmeldung_von_neuer_adresse_ersetzt_handle() {
        let registry = Registry::neu();
        let (client, _rx1) = test_client(5000);
        registry.client_hinzufuegen(client);
        registry.client_aktualisieren(&adresse(5000), ClientGuid::from("c1"), None);

        // Derselbe Client verbindet sich von einer neuen Adresse
        let (neuer, _rx2) = test_client(5001);
        registry.client_hinzufuegen(neuer);
        registry.client_aktualisieren(&adresse(5001), ClientGuid::from("c1"), None);

        assert_eq!(registry.client_anzahl(), 1, "alter Record muss weg sein");
        let record = registry
            .client_nach_guid(&ClientGuid::from("c1"))
            .expect("Record erwartet");
        assert_eq!(record.adresse, adresse(5001));
        // Die Raeumung der alten Verbindung ist ein No-op
        assert!(registry
            .client_entfernen_nach_adresse(&adresse(5000))
            .is_none());
    }

    #[test]
    fn client_entfernen_nach_guid_oder_adresse() {
        let registry = Registry::neu();
        let (client, _rx) = test_client(5000);
        registry.client_hinzufuegen(client);
        let record = registry
            .client_aktualisieren(&adresse(5000), ClientGuid::from("c1"), None)
            .unwrap();

        assert!(registry.client_entfernen(&record));
        assert_eq!(registry.client_anzahl(), 0);
        assert!(
            !registry.client_entfernen(&record),
            "zweites Entfernen ist no-op"
        );
    }

    #[test]
    fn kanal_anlegen_setzt_besitzer_als_abonnent() {
        let registry = Registry::neu();
        let besitzer = ClientGuid::from("c1");
        assert!(registry.kanal_hinzufuegen(besitzer.clone(), test_kanal("k1", "lobby")));

        let kanal = registry
            .kanal_nach_guid(&ChannelGuid::from("k1"))
            .expect("Kanal erwartet");
        assert_eq!(kanal.besitzer, besitzer);
        assert_eq!(kanal.abonnenten, vec![besitzer]);
    }

    #[test]
    fn kanal_doppelte_kennung_schlaegt_fehl() {
        let registry = Registry::neu();
        assert!(registry.kanal_hinzufuegen(ClientGuid::from("c1"), test_kanal("k1", "lobby")));
        assert!(!registry.kanal_hinzufuegen(ClientGuid::from("c2"), test_kanal("k1", "anders")));
    }

    #[test]
    fn kanal_name_suche_ignoriert_gross_kleinschreibung() {
        let registry = Registry::neu();
        registry.kanal_hinzufuegen(ClientGuid::from("c1"), test_kanal("k1", "Lobby"));
        assert!(registry.kanal_nach_name("lobby").is_some());
        assert!(registry.kanal_nach_name("LOBBY").is_some());
        assert!(registry.kanal_nach_name("flur").is_none());
    }

    #[test]
    fn abonnenten_bleiben_duplikatfrei() {
        let registry = Registry::neu();
        registry.kanal_hinzufuegen(ClientGuid::from("c1"), test_kanal("k1", "lobby"));
        let kanal_guid = ChannelGuid::from("k1");

        assert_eq!(
            registry.kanal_abonnent_hinzufuegen(&kanal_guid, ClientGuid::from("c2")),
            Some(true)
        );
        assert_eq!(
            registry.kanal_abonnent_hinzufuegen(&kanal_guid, ClientGuid::from("c2")),
            Some(false),
            "zweiter Beitritt fuegt nichts hinzu"
        );
        assert_eq!(
            registry.kanal_abonnenten(&kanal_guid).unwrap().len(),
            2,
            "Besitzer + ein Abonnent"
        );
    }

    #[test]
    fn abonnent_entfernen_ist_idempotent() {
        let registry = Registry::neu();
        registry.kanal_hinzufuegen(ClientGuid::from("c1"), test_kanal("k1", "lobby"));
        let kanal_guid = ChannelGuid::from("k1");
        registry.kanal_abonnent_hinzufuegen(&kanal_guid, ClientGuid::from("c2"));

        assert_eq!(
            registry.kanal_abonnent_entfernen(&kanal_guid, &ClientGuid::from("c2")),
            Some(true)
        );
        assert_eq!(
            registry.kanal_abonnent_entfernen(&kanal_guid, &ClientGuid::from("c2")),
            Some(false)
        );
    }

    #[test]
    fn kanal_entfernen_liefert_uebrige_abonnenten() {
        let registry = Registry::neu();
        registry.kanal_hinzufuegen(ClientGuid::from("c1"), test_kanal("k1", "lobby"));
        let kanal_guid = ChannelGuid::from("k1");
        registry.kanal_abonnent_hinzufuegen(&kanal_guid, ClientGuid::from("c2"));
        registry.kanal_abonnent_hinzufuegen(&kanal_guid, ClientGuid::from("c3"));

        let (kanal, andere) = registry.kanal_entfernen(&kanal_guid).expect("Kanal erwartet");
        assert_eq!(kanal.name, "lobby");
        assert_eq!(andere, vec![ClientGuid::from("c2"), ClientGuid::from("c3")]);
        assert!(registry.kanal_nach_guid(&kanal_guid).is_none());
    }

    #[test]
    fn kanal_ohne_abonnenten_entfernen_meldet_niemanden() {
        let registry = Registry::neu();
        registry.kanal_hinzufuegen(ClientGuid::from("c1"), test_kanal("k1", "lobby"));
        let (_, andere) = registry.kanal_entfernen(&ChannelGuid::from("k1")).unwrap();
        assert!(andere.is_empty());
    }

    #[test]
    fn client_kanaele_entfernen_trifft_nur_eigene() {
        let registry = Registry::neu();
        registry.kanal_hinzufuegen(ClientGuid::from("c1"), test_kanal("k1", "eins"));
        registry.kanal_hinzufuegen(ClientGuid::from("c1"), test_kanal("k2", "zwei"));
        registry.kanal_hinzufuegen(ClientGuid::from("c2"), test_kanal("k3", "drei"));

        let entfernt = registry.client_kanaele_entfernen(&ClientGuid::from("c1"));
        assert_eq!(entfernt.len(), 2);
        assert_eq!(registry.kanal_anzahl(), 1);
        assert!(registry.kanal_nach_guid(&ChannelGuid::from("k3")).is_some());
    }

    #[test]
    fn abonnent_ueberall_entfernen() {
        let registry = Registry::neu();
        registry.kanal_hinzufuegen(ClientGuid::from("c1"), test_kanal("k1", "eins"));
        registry.kanal_hinzufuegen(ClientGuid::from("c2"), test_kanal("k2", "zwei"));
        registry.kanal_abonnent_hinzufuegen(&ChannelGuid::from("k1"), ClientGuid::from("c3"));
        registry.kanal_abonnent_hinzufuegen(&ChannelGuid::from("k2"), ClientGuid::from("c3"));

        registry.abonnent_ueberall_entfernen(&ClientGuid::from("c3"));
        assert!(!registry.ist_kanal_abonnent(&ChannelGuid::from("k1"), &ClientGuid::from("c3")));
        assert!(!registry.ist_kanal_abonnent(&ChannelGuid::from("k2"), &ClientGuid::from("c3")));
        // Besitzer bleiben Abonnenten ihrer Kanaele
        assert!(registry.ist_kanal_abonnent(&ChannelGuid::from("k1"), &ClientGuid::from("c1")));
    }
}
