//! 后台任务启动器 - 基础设施层
//!
//! ## 职责
//!
//! 从请求处理线程启动一个长任务并立即返回：
//! 1. 为每个任务创建独立线程
//! 2. 在线程内创建单线程 runtime 驱动任务直到结束
//! 3. 任务结束后销毁 runtime 和线程
//!
//! 任务自身负责捕获并记录业务错误；启动器只报告任务是正常结束、被取消还是崩溃。

use crate::error::AppResult;
use futures::future::{AbortHandle, Abortable, Aborted};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

/// 任务最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// 任务运行结束（业务成功与否由任务自己记录）
    Finished,
    /// 任务被取消
    Cancelled,
    /// 任务 panic 或执行环境创建失败
    Crashed(String),
}

/// 已启动任务的句柄
#[derive(Debug)]
pub struct JobHandle {
    name: String,
    abort: AbortHandle,
    done: Option<oneshot::Receiver<JobOutcome>>,
    thread: Option<JoinHandle<()>>,
}

impl JobHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 请求取消任务
    ///
    /// 任务在下一个挂起点被丢弃，持有的守卫和闸门许可随之释放。
    pub fn cancel(&self) {
        debug!("取消任务: {}", self.name);
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.thread
            .as_ref()
            .map(|thread| thread.is_finished())
            .unwrap_or(true)
    }

    /// 等待任务结束
    pub async fn wait(mut self) -> JobOutcome {
        let outcome = match self.done.take() {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| JobOutcome::Crashed("任务线程异常退出".to_string())),
            None => JobOutcome::Crashed("任务结果已被读取".to_string()),
        };

        if let Some(thread) = self.thread.take() {
            // 结果已发送，线程只剩 runtime 析构
            let _ = tokio::task::spawn_blocking(move || thread.join()).await;
        }

        outcome
    }
}

/// 任务启动器
#[derive(Debug, Clone, Default)]
pub struct JobLauncher;

impl JobLauncher {
    pub fn new() -> Self {
        Self
    }

    /// 启动任务并立即返回句柄
    ///
    /// # 参数
    /// - `name`: 任务名（用于线程名和日志）
    /// - `unit`: 要执行的异步任务
    pub fn launch<F>(&self, name: impl Into<String>, unit: F) -> AppResult<JobHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (abort, registration) = AbortHandle::new_pair();
        let (tx, rx) = oneshot::channel();

        let job_name = name.clone();
        let thread = std::thread::Builder::new()
            .name(format!("job-{}", short_name(&name)))
            .spawn(move || {
                let outcome = run_to_completion(&job_name, Abortable::new(unit, registration));
                let _ = tx.send(outcome);
            })?;

        debug!("任务已启动: {}", name);

        Ok(JobHandle {
            name,
            abort,
            done: Some(rx),
            thread: Some(thread),
        })
    }
}

/// 在私有单线程 runtime 上驱动任务
fn run_to_completion<F>(name: &str, unit: F) -> JobOutcome
where
    F: Future<Output = Result<(), Aborted>>,
{
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("任务 {} 创建 runtime 失败: {}", name, e);
            return JobOutcome::Crashed(format!("创建 runtime 失败: {}", e));
        }
    };

    let result = runtime.block_on(AssertUnwindSafe(unit).catch_unwind());
    drop(runtime);

    match result {
        Ok(Ok(())) => JobOutcome::Finished,
        Ok(Err(Aborted)) => {
            warn!("任务 {} 已取消", name);
            JobOutcome::Cancelled
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("任务 {} 崩溃: {}", name, message);
            JobOutcome::Crashed(message)
        }
    }
}

/// 提取 panic 信息
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知 panic".to_string()
    }
}

/// 线程名：去掉控制字符（系统线程名不允许内部 NUL），最多 24 个字符
fn short_name(name: &str) -> String {
    name.chars().filter(|c| !c.is_control()).take(24).collect()
}
