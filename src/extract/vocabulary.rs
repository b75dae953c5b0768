//! Word lists the extractor matches against.
//!
//! All entries are compared against folded text (lowercase, no diacritics),
//! so they must be written folded too. The defaults carry the labels the host
//! app shows in English and Portuguese.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    /// Any of these makes a text plausible even without all three units.
    pub offer_keywords: Vec<String>,
    /// Phrases that mark the line carrying the trip leg.
    pub trip_phrases: Vec<String>,
    /// Markers that anchor the destination address.
    pub destination_markers: Vec<String>,
    /// Words on the pickup leg line ("3 min (1.2 km) away").
    pub pickup_hints: Vec<String>,
    /// Phrases shown while the driver is on the way to the passenger.
    pub pickup_state_phrases: Vec<String>,
    /// Ride tier labels. Order matters: the first match wins.
    pub service_labels: Vec<String>,
    pub street_tokens: Vec<String>,
    pub city_hints: Vec<String>,
    /// Button captions and other chrome that is never an address.
    pub ui_noise: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            offer_keywords: strings(&[
                "accept",
                "confirm",
                "new trip",
                "new request",
                "estimated fare",
                "fare",
                "total",
                "you receive",
                "exclusive",
                "flash",
                "aceitar",
                "confirmar",
                "nova viagem",
                "novo pedido",
                "valor estimado",
                "tarifa",
                "receber",
                "apos deducao",
            ]),
            trip_phrases: strings(&[
                "trip of",
                "route of",
                "trip time",
                "tempo de viagem",
                "viagem de",
                "percurso de",
            ]),
            destination_markers: strings(&["destination", "drop-off", "dropoff", "destino"]),
            pickup_hints: strings(&["away", "distance", "distancia"]),
            pickup_state_phrases: strings(&["picking up", "a recolher"]),
            service_labels: strings(&[
                "business comfort",
                "green teens",
                "uberx",
                "ubergreen",
                "comfort",
                "black",
                "green",
                "xl",
                "pet",
                "wav",
                "assist",
                "pool",
                "flash",
                "taxi",
                "exclusive",
                "exclusivo",
            ]),
            street_tokens: strings(&[
                "street", "st.", "avenue", "ave.", "road", "rd.", "lane", "square", "rua",
                "r.", "avenida", "av.", "travessa", "tv.", "praca", "estrada", "estr.",
                "alameda", "largo", "rotunda", "bairro", "urbanizacao", "calcada", "cais",
                "praceta", "lote", "bloco",
            ]),
            city_hints: strings(&[
                "lisboa",
                "lisbon",
                "oeiras",
                "odivelas",
                "loures",
                "amadora",
                "cascais",
                "sintra",
                "almada",
                "barreiro",
                "seixal",
                "matosinhos",
                "porto",
                "gondomar",
                "vila nova de gaia",
                "braga",
                "coimbra",
                "faro",
                "aveiro",
                "setubal",
                "leiria",
            ]),
            ui_noise: strings(&[
                "share",
                "edit",
                "match",
                "delete",
                "see on map",
                "view on map",
                "on the way",
                "picking up",
                "accept",
                "partilhar",
                "editar",
                "corresponder",
                "adicionar",
                "eliminar",
                "ver no mapa",
                "carregamento rapido",
                "a recolher",
                "a caminho",
                "aceitar",
            ]),
        }
    }
}
