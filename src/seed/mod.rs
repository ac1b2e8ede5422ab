use anyhow::Result;
use serde_json::{json, Value};

use crate::store::StaticSchemaSource;

/// Demonstration schema: an opus with parts, subparts and voices, the people
/// involved and the two specification annotation models
pub fn opus_schema() -> Value {
    json!({
        "info": {"title": "Opus catalogue", "version": "1"},
        "definitions": {
            "Work": {
                "type": "object",
                "required": ["title"],
                "properties": {
                    "id": {"type": "integer"},
                    "title": {"type": "string", "minLength": 2, "x-order": 1},
                    "_links": {"type": "object"}
                }
            },
            "Opus": {
                "title": "Opus",
                "allOf": [
                    {"$ref": "#/definitions/Work"},
                    {
                        "properties": {
                            "opusNumber": {"type": "string", "pattern": "[0-9]+[a-z]?", "x-order": 2},
                            "composer": {"type": "object", "x-reference": "person", "x-order": 3},
                            "genre": {"type": "object", "x-taxonomy": "genre", "x-order": 4},
                            "dating": {
                                "type": "object",
                                "x-order": 5,
                                "properties": {
                                    "year": {"type": "integer", "minimum": 1000, "maximum": 2100},
                                    "approximate": {"type": "boolean"}
                                }
                            },
                            "parts": {
                                "type": "array",
                                "x-order": 6,
                                "items": {"$ref": "#/definitions/Part"}
                            },
                            "remarks": {"type": "string", "x-nullable": true, "x-allowSave": true, "maxLength": 500},
                            "specifications": {"type": "array", "items": {"type": "object"}}
                        }
                    }
                ]
            },
            "Part": {
                "type": "object",
                "properties": {
                    "id": {"type": "integer"},
                    "name": {"type": "string", "x-required": true},
                    "subparts": {"type": "array", "items": {"$ref": "#/definitions/Subpart"}}
                }
            },
            "Subpart": {
                "type": "object",
                "properties": {
                    "id": {"type": "integer"},
                    "label": {"type": "string", "x-nullValue": ""},
                    "voices": {"type": "array", "items": {"$ref": "#/definitions/Voice"}}
                }
            },
            "Voice": {
                "type": "object",
                "properties": {
                    "id": {"type": "integer"},
                    "name": {"type": "string"},
                    "clef": {
                        "type": "string",
                        "enum": ["treble", "alto", "tenor", "bass"],
                        "x-enumTranslation": {"treble": "G", "alto": "C3", "tenor": "C4", "bass": "F"},
                        "example": "treble"
                    },
                    "performer": {"type": "object", "x-reference": "person", "x-nullable": true}
                }
            },
            "Person": {
                "type": "object",
                "properties": {
                    "id": {"type": "integer"},
                    "name": {"type": "string", "x-required": true, "minLength": 2},
                    "born": {"type": "integer", "x-nullable": true}
                }
            },
            "SpecificationAA": {
                "type": "object",
                "properties": {
                    "share": {"type": "object", "x-taxonomy": "share"},
                    "occurence": {"type": "object", "x-taxonomy": "occurence"}
                }
            },
            "SpecificationAAI": {
                "allOf": [
                    {"$ref": "#/definitions/SpecificationAA"},
                    {
                        "properties": {
                            "instrumentation": {
                                "type": "array",
                                "x-reference": "instrument",
                                "x-isArray": true,
                                "minItems": 1
                            }
                        }
                    }
                ]
            }
        }
    })
}

pub fn opus_source() -> Result<StaticSchemaSource> {
    StaticSchemaSource::from_value(opus_schema())
}
