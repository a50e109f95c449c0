use serde::{Deserialize, Serialize};

/// How an update payload is combined with the stored `objRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateWay {
    /// Take the incoming payload wholesale
    Replace,
    /// Deep merge; arrays merge index by index
    #[default]
    Merge,
    MergeButReplaceArrays,
    MergeButConcatArrays,
    MergeButKeepArrays,
}

/// What bulk upsert does with an item whose conflict keys match an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnConflict {
    Replace,
    #[default]
    Merge,
    MergeButReplaceArrays,
    MergeButConcatArrays,
    MergeButKeepArrays,
    /// Leave the existing record alone and report the item as ignored
    Ignore,
    /// Leave the existing record alone and report the item as failed
    Fail,
}

impl OnConflict {
    /// The merge strategy to apply, or `None` for ignore/fail.
    pub fn merge_strategy(&self) -> Option<UpdateWay> {
        match self {
            OnConflict::Replace => Some(UpdateWay::Replace),
            OnConflict::Merge => Some(UpdateWay::Merge),
            OnConflict::MergeButReplaceArrays => Some(UpdateWay::MergeButReplaceArrays),
            OnConflict::MergeButConcatArrays => Some(UpdateWay::MergeButConcatArrays),
            OnConflict::MergeButKeepArrays => Some(UpdateWay::MergeButKeepArrays),
            OnConflict::Ignore | OnConflict::Fail => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        let way: UpdateWay = serde_json::from_str("\"mergeButConcatArrays\"").unwrap();
        assert_eq!(way, UpdateWay::MergeButConcatArrays);

        let on_conflict: OnConflict = serde_json::from_str("\"ignore\"").unwrap();
        assert_eq!(on_conflict.merge_strategy(), None);
        assert_eq!(OnConflict::Replace.merge_strategy(), Some(UpdateWay::Replace));
    }
}
