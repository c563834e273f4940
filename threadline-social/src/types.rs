use serde::{Deserialize, Deserializer, Serialize};

/// One page of `GET /thread/?hashtag=..` results.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ThreadPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<Thread>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub next_page: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Thread {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    pub user_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub likes: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parent_thread: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub repost_count: i64,
}

/// Profile of a thread's author, as served by `GET /account/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AccountInfo {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub profile_image_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub follower: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub following: i64,
}

// The upstream API sends `null` for absent scalars.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_page_tolerates_nulls() {
        let page: ThreadPage = serde_json::from_str(
            r#"{
                "data": [
                    {"_id":"t1","text":"hello #rust","user_id":"u1","likes":3,
                     "parent_thread":null,"repost_count":1}
                ],
                "next_page": null
            }"#,
        )
        .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].parent_thread, "");
        assert_eq!(page.next_page, "");
    }

    #[test]
    fn thread_requires_author() {
        let res = serde_json::from_str::<Thread>(r#"{"_id":"t1","text":"orphan"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn account_wire_names() {
        let account = AccountInfo {
            id: "u1".into(),
            display_name: "Gopher".into(),
            username: "gopher".into(),
            profile_image_url: "https://img.example/u1.png".into(),
            description: String::new(),
            follower: 10,
            following: 2,
        };
        let v = serde_json::to_value(&account).unwrap();
        assert_eq!(v["_id"], "u1");
        assert_eq!(v["display_name"], "Gopher");
        assert_eq!(v["follower"], 10);
    }
}
