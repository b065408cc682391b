//! Record fixtures for analyzer tests.

use rust_decimal::Decimal;

use crate::types::{ChannelType, MatchType, Metrics, Record, RecordKind, RecordStatus};

pub(crate) struct RecordBuilder(Record);

fn base(kind: RecordKind, id: &str, text: &str) -> RecordBuilder {
    RecordBuilder(Record {
        id: id.to_string(),
        kind,
        text: text.to_string(),
        match_type: None,
        status: Some(RecordStatus::Enabled),
        campaign_id: "c1".to_string(),
        campaign_type: ChannelType::Search,
        ad_group_id: Some("ag1".to_string()),
        keyword_id: None,
        location: None,
        metrics: Metrics::default(),
    })
}

pub(crate) fn keyword(id: &str, text: &str) -> RecordBuilder {
    base(RecordKind::Keyword, id, text).match_type(MatchType::Broad)
}

pub(crate) fn search_term(id: &str, text: &str) -> RecordBuilder {
    base(RecordKind::SearchTerm, id, text)
}

pub(crate) fn negative(id: &str, text: &str) -> RecordBuilder {
    base(RecordKind::NegativeKeyword, id, text)
}

pub(crate) fn geo(id: &str, location: &str) -> RecordBuilder {
    let mut builder = base(RecordKind::GeoSegment, id, location);
    builder.0.location = Some(location.to_string());
    builder
}

impl RecordBuilder {
    /// impressions, clicks, cost, conversions, conversion value
    pub(crate) fn metrics(
        mut self,
        impressions: u64,
        clicks: u64,
        cost: i64,
        conversions: i64,
        value: i64,
    ) -> Self {
        self.0.metrics = Metrics {
            impressions,
            clicks,
            cost: Decimal::from(cost),
            conversions: Decimal::from(conversions),
            conversion_value: Decimal::from(value),
        };
        self
    }

    pub(crate) fn campaign(mut self, id: &str, channel: ChannelType) -> Self {
        self.0.campaign_id = id.to_string();
        self.0.campaign_type = channel;
        self
    }

    pub(crate) fn ad_group(mut self, id: Option<&str>) -> Self {
        self.0.ad_group_id = id.map(str::to_string);
        self
    }

    pub(crate) fn keyword_id(mut self, id: &str) -> Self {
        self.0.keyword_id = Some(id.to_string());
        self
    }

    pub(crate) fn match_type(mut self, match_type: MatchType) -> Self {
        self.0.match_type = Some(match_type);
        self
    }

    pub(crate) fn status(mut self, status: RecordStatus) -> Self {
        self.0.status = Some(status);
        self
    }

    pub(crate) fn build(self) -> Record {
        self.0
    }
}
