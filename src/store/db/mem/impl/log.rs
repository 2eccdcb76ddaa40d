use std::collections::HashMap;

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::Log, db::mem::DbDocument},
};

impl DbDocument for Log {
    const INDEX: Option<&'static str> = Some("rid");

    fn id(&self) -> &str {
        &self.id
    }

    fn index_value(&self) -> &str {
        &self.rid
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), json!(self.id.clone()));
        map.insert("rid".to_string(), json!(self.rid.clone()));
        map.insert("nid".to_string(), json!(self.nid.clone()));
        map.insert("seq".to_string(), json!(self.seq));
        map.insert("level".to_string(), json!(self.level.clone()));
        map.insert("timestamp".to_string(), json!(self.timestamp));
        Ok(map)
    }
}
