#![allow(dead_code)]

use serde_json::{json, Value};
use std::fs;
use std::path::Path;

pub fn write_json(dir: &Path, file: &str, descriptor: Value) {
    fs::write(dir.join(file), serde_json::to_string_pretty(&descriptor).unwrap()).unwrap();
}

pub fn hotel_descriptor() -> Value {
    json!({
        "tool_id": "hotel_reservation",
        "description": "Reserve hotel rooms",
        "when_to_use": "book a hotel room",
        "how_to_use": {
            "inputs": [
                { "name": "city", "type": "string", "description": "Destination city" },
                { "name": "nights", "type": "integer", "description": "Length of stay" }
            ],
            "outputs": { "success": "Reservation confirmed", "failure": [] }
        }
    })
}

/// Writes `hotel_reservation.json` and `flight_booking.yaml` into `dir`.
pub fn write_travel_tools(dir: &Path) {
    write_json(dir, "hotel_reservation.json", hotel_descriptor());
    fs::write(
        dir.join("flight_booking.yaml"),
        "tool_id: flight_booking\n\
         description: Book airline tickets\n\
         when_to_use: book a flight\n",
    )
    .unwrap();
}
