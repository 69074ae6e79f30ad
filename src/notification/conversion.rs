//! Conversion between v2beta1 and the v2beta2 hub.
//!
//! Converting up leaves the hub-only fields unset. Converting down drops
//! them, along with the Feishu, Pushover and SMS channels.

use super::{v2beta1, v2beta2};

// Implements `From` in both directions for structs whose fields match.
// Fields listed under `map` hold a nested version-specific type.
macro_rules! convert_both_ways {
    ($a:ty, $b:ty { $($field:ident),* $(,)? } $(map { $($mapped:ident),* $(,)? })?) => {
        impl From<$a> for $b {
            fn from(src: $a) -> Self {
                Self {
                    $($field: src.$field,)*
                    $($($mapped: src.$mapped.map(Into::into),)*)?
                }
            }
        }

        impl From<$b> for $a {
            fn from(src: $b) -> Self {
                Self {
                    $($field: src.$field,)*
                    $($($mapped: src.$mapped.map(Into::into),)*)?
                }
            }
        }
    };
}

convert_both_ways!(v2beta1::DingTalkApplicationConfig, v2beta2::DingTalkApplicationConfig {
    app_key,
    app_secret,
});
convert_both_ways!(v2beta1::DingTalkConfig, v2beta2::DingTalkConfig { labels } map { conversation });
convert_both_ways!(v2beta1::EmailConfig, v2beta2::EmailConfig {
    labels,
    from,
    smart_host,
    hello,
    auth_username,
    auth_identify,
    auth_password,
    auth_secret,
    require_tls,
    tls,
});
convert_both_ways!(v2beta1::SlackConfig, v2beta2::SlackConfig { labels, slack_token_secret });
convert_both_ways!(v2beta1::WebhookConfig, v2beta2::WebhookConfig { labels });
convert_both_ways!(v2beta1::WechatConfig, v2beta2::WechatConfig {
    labels,
    wechat_api_url,
    wechat_api_corp_id,
    wechat_api_agent_id,
    wechat_api_secret,
});
convert_both_ways!(v2beta1::DingTalkConversation, v2beta2::DingTalkConversation { chatids });

impl From<v2beta1::ConfigSpec> for v2beta2::ConfigSpec {
    fn from(src: v2beta1::ConfigSpec) -> Self {
        Self {
            dingtalk: src.dingtalk.map(Into::into),
            email: src.email.map(Into::into),
            slack: src.slack.map(Into::into),
            webhook: src.webhook.map(Into::into),
            wechat: src.wechat.map(Into::into),
            ..Default::default()
        }
    }
}

impl From<v2beta2::ConfigSpec> for v2beta1::ConfigSpec {
    fn from(src: v2beta2::ConfigSpec) -> Self {
        Self {
            dingtalk: src.dingtalk.map(Into::into),
            email: src.email.map(Into::into),
            slack: src.slack.map(Into::into),
            webhook: src.webhook.map(Into::into),
            wechat: src.wechat.map(Into::into),
        }
    }
}

impl From<v2beta1::Config> for v2beta2::Config {
    fn from(src: v2beta1::Config) -> Self {
        let mut dst = Self::new("", src.spec.into());
        dst.metadata = src.metadata;
        dst
    }
}

impl From<v2beta2::Config> for v2beta1::Config {
    fn from(src: v2beta2::Config) -> Self {
        let mut dst = Self::new("", src.spec.into());
        dst.metadata = src.metadata;
        dst
    }
}

impl From<v2beta1::DingTalkChatBot> for v2beta2::DingTalkChatBot {
    fn from(src: v2beta1::DingTalkChatBot) -> Self {
        Self {
            webhook: src.webhook,
            keywords: src.keywords,
            secret: src.secret,
            ..Default::default()
        }
    }
}

impl From<v2beta2::DingTalkChatBot> for v2beta1::DingTalkChatBot {
    fn from(src: v2beta2::DingTalkChatBot) -> Self {
        Self {
            webhook: src.webhook,
            keywords: src.keywords,
            secret: src.secret,
        }
    }
}

impl From<v2beta1::DingTalkReceiver> for v2beta2::DingTalkReceiver {
    fn from(src: v2beta1::DingTalkReceiver) -> Self {
        Self {
            enabled: src.enabled,
            dingtalk_config_selector: src.dingtalk_config_selector,
            conversation: src.conversation.map(Into::into),
            chatbot: src.chatbot.map(Into::into),
            ..Default::default()
        }
    }
}

impl From<v2beta2::DingTalkReceiver> for v2beta1::DingTalkReceiver {
    fn from(src: v2beta2::DingTalkReceiver) -> Self {
        Self {
            enabled: src.enabled,
            dingtalk_config_selector: src.dingtalk_config_selector,
            conversation: src.conversation.map(Into::into),
            chatbot: src.chatbot.map(Into::into),
        }
    }
}

impl From<v2beta1::EmailReceiver> for v2beta2::EmailReceiver {
    fn from(src: v2beta1::EmailReceiver) -> Self {
        Self {
            enabled: src.enabled,
            to: src.to,
            email_config_selector: src.email_config_selector,
            ..Default::default()
        }
    }
}

impl From<v2beta2::EmailReceiver> for v2beta1::EmailReceiver {
    fn from(src: v2beta2::EmailReceiver) -> Self {
        Self {
            enabled: src.enabled,
            to: src.to,
            email_config_selector: src.email_config_selector,
        }
    }
}

impl From<v2beta1::SlackReceiver> for v2beta2::SlackReceiver {
    fn from(src: v2beta1::SlackReceiver) -> Self {
        Self {
            enabled: src.enabled,
            slack_config_selector: src.slack_config_selector,
            channels: src.channels,
            ..Default::default()
        }
    }
}

impl From<v2beta2::SlackReceiver> for v2beta1::SlackReceiver {
    fn from(src: v2beta2::SlackReceiver) -> Self {
        Self {
            enabled: src.enabled,
            slack_config_selector: src.slack_config_selector,
            channels: src.channels,
        }
    }
}

impl From<v2beta1::WebhookReceiver> for v2beta2::WebhookReceiver {
    fn from(src: v2beta1::WebhookReceiver) -> Self {
        Self {
            enabled: src.enabled,
            webhook_config_selector: src.webhook_config_selector,
            url: src.url,
            service: src.service,
            http_config: src.http_config,
            ..Default::default()
        }
    }
}

impl From<v2beta2::WebhookReceiver> for v2beta1::WebhookReceiver {
    fn from(src: v2beta2::WebhookReceiver) -> Self {
        Self {
            enabled: src.enabled,
            webhook_config_selector: src.webhook_config_selector,
            url: src.url,
            service: src.service,
            http_config: src.http_config,
        }
    }
}

impl From<v2beta1::WechatReceiver> for v2beta2::WechatReceiver {
    fn from(src: v2beta1::WechatReceiver) -> Self {
        Self {
            enabled: src.enabled,
            wechat_config_selector: src.wechat_config_selector,
            to_user: src.to_user,
            to_party: src.to_party,
            to_tag: src.to_tag,
            ..Default::default()
        }
    }
}

impl From<v2beta2::WechatReceiver> for v2beta1::WechatReceiver {
    fn from(src: v2beta2::WechatReceiver) -> Self {
        Self {
            enabled: src.enabled,
            wechat_config_selector: src.wechat_config_selector,
            to_user: src.to_user,
            to_party: src.to_party,
            to_tag: src.to_tag,
        }
    }
}

impl From<v2beta1::ReceiverSpec> for v2beta2::ReceiverSpec {
    fn from(src: v2beta1::ReceiverSpec) -> Self {
        Self {
            dingtalk: src.dingtalk.map(Into::into),
            email: src.email.map(Into::into),
            slack: src.slack.map(Into::into),
            webhook: src.webhook.map(Into::into),
            wechat: src.wechat.map(Into::into),
            ..Default::default()
        }
    }
}

impl From<v2beta2::ReceiverSpec> for v2beta1::ReceiverSpec {
    fn from(src: v2beta2::ReceiverSpec) -> Self {
        Self {
            dingtalk: src.dingtalk.map(Into::into),
            email: src.email.map(Into::into),
            slack: src.slack.map(Into::into),
            webhook: src.webhook.map(Into::into),
            wechat: src.wechat.map(Into::into),
        }
    }
}

impl From<v2beta1::Receiver> for v2beta2::Receiver {
    fn from(src: v2beta1::Receiver) -> Self {
        let mut dst = Self::new("", src.spec.into());
        dst.metadata = src.metadata;
        dst
    }
}

impl From<v2beta2::Receiver> for v2beta1::Receiver {
    fn from(src: v2beta2::Receiver) -> Self {
        let mut dst = Self::new("", src.spec.into());
        dst.metadata = src.metadata;
        dst
    }
}
