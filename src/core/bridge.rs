use actix::WeakAddr;

use super::messages::TaskEvent;
use super::session::SessionActor;
use super::transport::{ChallengeDisposition, ResponseDisposition, TaskId, TransportEvent};

/// 委托桥接器：传输层异步回调的汇入口
///
/// 只持有会话的非拥有引用。会话已销毁时在途回调就地降级：
/// 质询按默认处理，响应处置为取消，其余事件丢弃。
#[derive(Clone)]
pub struct DelegateBridge {
    session: WeakAddr<SessionActor>,
}

impl DelegateBridge {
    pub fn new(session: WeakAddr<SessionActor>) -> Self {
        Self { session }
    }

    pub fn deliver(&self, id: TaskId, event: TransportEvent) {
        match self.session.upgrade() {
            Some(addr) => addr.do_send(TaskEvent { id, event }),
            None => Self::default_dispose(id, event),
        }
    }

    fn default_dispose(id: TaskId, event: TransportEvent) {
        match event {
            TransportEvent::Challenge { reply, .. } => {
                let _ = reply.send(ChallengeDisposition::PerformDefaultHandling);
            }
            TransportEvent::Metadata { reply, .. } => {
                let _ = reply.send(ResponseDisposition::Cancel);
            }
            _ => log::debug!("会话已销毁，丢弃 {} 的传输事件", id),
        }
    }
}
