use serde_json::{json, Value};

use crate::document::InvoiceDocument;
use crate::validate::{validate, ValidatorOptions};

/// A complete, valid invoice from a German seller to a French buyer: 250.00 net, 41.50 VAT.
pub(crate) fn sample_json() -> Value {
    json!({
        "general": {
            "invoiceNumberPrefix": "INV",
            "invoiceNumberValue": "2024-001",
            "issueDate": "2024-03-01",
            "dueDate": "2024-03-31",
            "currency": "EUR",
            "language": "en",
            "template": "default"
        },
        "seller": {
            "name": "Acme GmbH",
            "address": "Hauptstrasse 1, 10115 Berlin",
            "vatNumber": "DE123456789",
            "email": "billing@acme.example",
            "accountNumber": "DE89370400440532013000",
            "swiftBic": "COBADEFFXXX",
            "countryCode": "DE",
            "showVatInPDF": true,
            "showAccountInPDF": true,
            "showSwiftInPDF": false,
            "notes": "",
            "showNotesInPDF": false
        },
        "buyer": {
            "name": "Client SARL",
            "address": "1 Rue de Rivoli, 75001 Paris",
            "vatNumber": "FR12345678901",
            "email": "ap@client.example",
            "countryCode": "FR"
        },
        "items": [
            { "id": "1", "description": "Consulting", "quantity": 2, "unitPrice": 100, "vatRate": 19 },
            { "id": "2", "description": "Printed guide", "quantity": 1, "unitPrice": 50, "vatRate": 7 }
        ],
        "payment": {
            "method": "Bank transfer",
            "dueDate": "2024-03-31",
            "terms": "Net 30",
            "showMethodInPDF": true,
            "showDueDateInPDF": true,
            "showTermsInPDF": true
        },
        "notes": { "content": "Thank you for your business.", "showInPDF": true },
        "signature": { "showInPDF": true, "name": "Jane Doe", "title": "Director" }
    })
}

pub(crate) fn sample_document() -> InvoiceDocument {
    match validate(&sample_json(), &ValidatorOptions::default()) {
        Ok(doc) => doc,
        Err(errors) => panic!("sample invoice must validate: {errors:?}"),
    }
}
